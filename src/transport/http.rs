use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use reqwest::Proxy;
use std::env;
use std::time::Duration;
use tracing::{debug, warn};

use super::{sse, Frame, FrameStream, OutboundCall, RawResponse, StreamFailure, Transport, TransportError};
use crate::{Error, ErrorContext, Result};

/// Connection settings for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Whole-request timeout for one-shot calls. Streams are not subject to it.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: Duration,
    pub proxy_url: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            pool_max_idle_per_host: 32,
            pool_idle_timeout: Duration::from_secs(90),
            proxy_url: None,
        }
    }
}

impl HttpConfig {
    /// Defaults overridden by environment:
    /// - `RESPONSES_HTTP_TIMEOUT_SECS`
    /// - `RESPONSES_HTTP_CONNECT_TIMEOUT_SECS`
    /// - `RESPONSES_HTTP_POOL_MAX_IDLE_PER_HOST`
    /// - `RESPONSES_HTTP_POOL_IDLE_TIMEOUT_SECS`
    /// - `RESPONSES_PROXY_URL`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let secs = |name: &str| env::var(name).ok().and_then(|s| s.parse::<u64>().ok());

        Self {
            timeout: secs("RESPONSES_HTTP_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            connect_timeout: secs("RESPONSES_HTTP_CONNECT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            pool_max_idle_per_host: env::var("RESPONSES_HTTP_POOL_MAX_IDLE_PER_HOST")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(defaults.pool_max_idle_per_host),
            pool_idle_timeout: secs("RESPONSES_HTTP_POOL_IDLE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.pool_idle_timeout),
            proxy_url: env::var("RESPONSES_PROXY_URL").ok().filter(|s| !s.trim().is_empty()),
        }
    }
}

/// reqwest-backed [`Transport`].
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Some(config.pool_idle_timeout))
            // Conservative HTTP/2 keepalive defaults for long-lived streams.
            .http2_adaptive_window(true)
            .http2_keep_alive_interval(Some(Duration::from_secs(30)))
            .http2_keep_alive_timeout(Duration::from_secs(10));

        if let Some(proxy_url) = &config.proxy_url {
            let proxy = Proxy::all(proxy_url).map_err(|e| {
                Error::configuration_with_context(
                    format!("invalid proxy url: {}", e),
                    ErrorContext::new()
                        .with_field_path("proxy_url")
                        .with_source("http_transport"),
                )
            })?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))?;

        Ok(Self {
            client,
            timeout: config.timeout,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(&HttpConfig::from_env())
    }

    fn request(&self, call: &OutboundCall) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .request(call.method.clone(), call.url.clone())
            .headers(call.headers.clone());
        if let Some(body) = &call.body {
            request = request.body(body.clone());
        }
        request
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn perform(&self, call: &OutboundCall) -> Result<RawResponse> {
        let response = self
            .request(call)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                warn!(method = %call.method, path = call.path(), error = %e, "request failed before a response");
                Error::Transport(TransportError::Http(e))
            })?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(TransportError::Http(e)))?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }

    fn open_stream(&self, call: &OutboundCall) -> FrameStream {
        let pending = self.request(call).send();
        let path = call.path().to_string();

        let frames = stream::once(pending).flat_map(move |sent| -> FrameStream {
            match sent {
                Err(e) => {
                    warn!(path = path.as_str(), error = %e, "stream connection failed");
                    let failure = StreamFailure::from_error(&Error::Transport(TransportError::Http(e)));
                    Box::pin(stream::iter([Frame::Error(failure)]))
                }
                Ok(response) if !response.status().is_success() => {
                    let status = response.status().as_u16();
                    debug!(path = path.as_str(), http_status = status, "stream rejected");
                    Box::pin(stream::once(async move {
                        let body = response.bytes().await.ok();
                        Frame::Error(StreamFailure {
                            status: Some(status),
                            body,
                            message: format!("HTTP status {}", status),
                        })
                    }))
                }
                Ok(response) => {
                    debug!(path = path.as_str(), http_status = response.status().as_u16(), "stream opened");
                    sse::decode_frames(Box::pin(
                        response
                            .bytes_stream()
                            .map_err(|e| Error::Transport(TransportError::Http(e))),
                    ))
                }
            }
        });

        Box::pin(frames)
    }
}
