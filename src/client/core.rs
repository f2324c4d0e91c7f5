use reqwest::header::HeaderMap;
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::client::builder::ApiClientBuilder;
use crate::client::session::StreamSession;
use crate::interceptors::{ErrorSite, InterceptorChain};
use crate::lenient;
use crate::transport::{OutboundCall, RawResponse, Transport, TransportError};
use crate::types::{ApiError, ErrorEnvelope, SkippableEvent};
use crate::{Error, ErrorContext, Result};

/// Outcome of a call the server answered: the payload, or the typed error it sent back.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Client core: builds outbound calls from the connection profile and dispatches them
/// through the interceptor chain and the transport.
///
/// Cheap to clone; clones share the transport and the interceptor chain.
#[derive(Clone)]
pub struct ApiClient {
    pub(crate) base_url: Url,
    pub(crate) headers: HeaderMap,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) interceptors: InterceptorChain,
}

impl ApiClient {
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::new()
    }

    /// Build a client from `OPENAI_*` environment variables.
    pub fn from_env() -> Result<Self> {
        ApiClientBuilder::from_env().build()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn interceptors(&self) -> &InterceptorChain {
        &self.interceptors
    }

    /// Start an outbound call for `path` (relative to the base URL) carrying the
    /// profile headers.
    pub fn call(&self, method: Method, path: &str) -> Result<OutboundCall> {
        let url = self
            .base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| {
                Error::configuration_with_context(
                    format!("invalid request path: {}", e),
                    ErrorContext::new()
                        .with_field_path("path")
                        .with_details(path.to_string()),
                )
            })?;

        let mut call = OutboundCall::new(method, url);
        call.headers = self.headers.clone();
        Ok(call)
    }

    /// Dispatch one call and decode the body as `T`.
    ///
    /// - status 200: the body must decode as `T`, otherwise `Err(Error::Decode)`
    /// - other statuses carrying `{"error": {...}}`: `Ok(Err(api_error))`
    /// - anything else: `Err(Error::Transport(TransportError::InvalidResponse))`
    pub async fn send<T: DeserializeOwned>(&self, call: OutboundCall) -> Result<ApiResult<T>> {
        let (call, response) = self.dispatch(call).await?;

        if response.status == 200 {
            return match lenient::decode::<T>(&response.body) {
                Ok(value) => Ok(Ok(value)),
                Err(e) => {
                    warn!(path = call.path(), error = %e, "failed to decode response body");
                    self.report(&call, Some(response.status), Some(response.body.as_ref()), &e);
                    Err(e)
                }
            };
        }
        self.classify_failure(&call, response).map(Err)
    }

    /// Dispatch a call whose body carries nothing of interest.
    ///
    /// Same status policy as [`send`](Self::send): only 200 succeeds, and a typed
    /// error is returned as `Err(Error::Api)`.
    pub async fn send_empty(&self, call: OutboundCall) -> Result<()> {
        let (call, response) = self.dispatch(call).await?;

        if response.status == 200 {
            return Ok(());
        }
        Err(Error::Api(self.classify_failure(&call, response)?))
    }

    /// Open a stream session. Returns as soon as the session exists; the connection is
    /// made by the session's producer task.
    pub async fn stream<E>(&self, call: OutboundCall) -> Result<StreamSession<E>>
    where
        E: DeserializeOwned + SkippableEvent + Send + 'static,
    {
        let call = call.header("Accept", "text/event-stream")?;
        let call = self.run_request_hooks(call)?;
        debug!(method = %call.method, path = call.path(), "opening stream");

        let frames = self.transport.open_stream(&call);
        let session = StreamSession::spawn(call, frames, self.interceptors.clone());
        debug!(session = %session.id(), "stream session started");
        Ok(session)
    }

    async fn dispatch(&self, call: OutboundCall) -> Result<(OutboundCall, RawResponse)> {
        let call = self.run_request_hooks(call)?;
        debug!(method = %call.method, path = call.path(), "dispatching request");

        let response = match self.transport.perform(&call).await {
            Ok(response) => response,
            Err(e) => {
                self.report(&call, e.status(), None, &e);
                return Err(e);
            }
        };

        let status = response.status;
        let response = match self.interceptors.apply_response(&call, response) {
            Ok(response) => response,
            Err(e) => {
                self.report(&call, Some(status), None, &e);
                return Err(e);
            }
        };
        debug!(
            method = %call.method,
            path = call.path(),
            http_status = response.status,
            "response received"
        );
        Ok((call, response))
    }

    fn run_request_hooks(&self, call: OutboundCall) -> Result<OutboundCall> {
        if self.interceptors.is_empty() {
            return Ok(call);
        }
        // Request hooks consume the call; keep the original for the error hook.
        let original = call.clone();
        self.interceptors.apply_request(call).map_err(|e| {
            self.report(&original, None, None, &e);
            e
        })
    }

    fn report(&self, call: &OutboundCall, status: Option<u16>, body: Option<&[u8]>, err: &Error) {
        let message = err.to_string();
        self.interceptors.notify_error(&ErrorSite {
            call,
            status,
            body,
            message: &message,
        });
    }

    /// A non-success response is a typed error when the body is the error envelope,
    /// and a transport failure otherwise.
    fn classify_failure(&self, call: &OutboundCall, response: RawResponse) -> Result<ApiError> {
        match lenient::decode::<ErrorEnvelope>(&response.body) {
            Ok(envelope) => {
                info!(
                    path = call.path(),
                    http_status = response.status,
                    error_type = envelope.error.kind.as_str(),
                    "API returned an error"
                );
                Ok(envelope.error)
            }
            Err(_) => {
                warn!(path = call.path(), http_status = response.status, "unexpected response");
                let message = format!("unexpected HTTP status {}", response.status);
                self.interceptors.notify_error(&ErrorSite {
                    call,
                    status: Some(response.status),
                    body: Some(response.body.as_ref()),
                    message: &message,
                });
                Err(Error::Transport(TransportError::InvalidResponse {
                    status: response.status,
                    body: response.body,
                }))
            }
        }
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("interceptors", &self.interceptors)
            .finish_non_exhaustive()
    }
}
