//! Transport gateway: one-shot HTTP calls and persistent SSE connections.
//!
//! The client core only depends on the [`Transport`] trait. [`HttpTransport`] is the
//! reqwest-backed implementation; tests and embedders can plug in their own.

pub mod http;
pub mod sse;

pub use http::{HttpConfig, HttpTransport};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::Serialize;
use std::pin::Pin;
use url::Url;

use crate::{Error, ErrorContext, Result};

/// A fully resolved outbound HTTP call.
///
/// Built by [`crate::ApiClient::call`] from the connection profile, then refined with
/// per-call overrides. The client takes ownership when dispatching it.
#[derive(Debug, Clone)]
pub struct OutboundCall {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl OutboundCall {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Set a header, replacing any previous value.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name_ref = name.as_ref();
        let header_name = HeaderName::from_bytes(name_ref.as_bytes()).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid header name: {}", e),
                ErrorContext::new().with_field_path(format!("headers.{}", name_ref)),
            )
        })?;
        let header_value = HeaderValue::from_str(value.as_ref()).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid header value: {}", e),
                ErrorContext::new().with_field_path(format!("headers.{}", name_ref)),
            )
        })?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// Append one path segment. `/`, `?`, `#` and `%` are percent-encoded, so the
    /// segment cannot change the rest of the path.
    pub fn segment(mut self, segment: &str) -> Self {
        if let Ok(mut segments) = self.url.path_segments_mut() {
            segments.pop_if_empty().push(segment);
        }
        self
    }

    /// Append a query parameter.
    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.url.query_pairs_mut().append_pair(key, value);
        self
    }

    /// Serialize `body` as the JSON request body.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        self.body = Some(Bytes::from(serde_json::to_vec(body)?));
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(self)
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }
}

/// Status and full body of a completed one-shot call.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

/// One unit read from a streaming connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Event(SseEvent),
    /// Terminal: the connection failed or answered with a non-success status.
    Error(StreamFailure),
}

impl Frame {
    /// A `message` event carrying `data`.
    pub fn data(data: impl Into<String>) -> Self {
        Frame::Event(SseEvent {
            event: None,
            data: Some(data.into()),
            id: None,
        })
    }
}

/// A server-sent event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: Option<String>,
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFailure {
    pub status: Option<u16>,
    pub body: Option<Bytes>,
    pub message: String,
}

impl StreamFailure {
    pub(crate) fn from_error(err: &Error) -> Self {
        Self {
            status: err.status(),
            body: None,
            message: err.to_string(),
        }
    }
}

/// Lazy sequence of frames from one streaming connection.
///
/// Dropping the stream closes the underlying connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Frame> + Send + 'static>>;

/// The contract the client core requires from a transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue one request and wait for the full body.
    ///
    /// Fails only when no response was obtained (DNS, connect, TLS, reset...).
    async fn perform(&self, call: &OutboundCall) -> Result<RawResponse>;

    /// Open a persistent connection.
    ///
    /// Must not do any I/O before the returned stream is first polled. Connection
    /// failures and non-success statuses surface as a single [`Frame::Error`].
    fn open_stream(&self, call: &OutboundCall) -> FrameStream;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status}: {}", body_preview(.body))]
    InvalidResponse { status: u16, body: Bytes },

    #[error("stream failed: {message}")]
    Stream {
        status: Option<u16>,
        body: Option<Bytes>,
        message: String,
    },

    #[error("Transport error: {0}")]
    Other(String),
}

fn body_preview(body: &Bytes) -> String {
    const MAX: usize = 512;
    let text = String::from_utf8_lossy(body);
    if text.chars().count() <= MAX {
        text.into_owned()
    } else {
        let mut cut: String = text.chars().take(MAX).collect();
        cut.push('…');
        cut
    }
}

impl From<StreamFailure> for TransportError {
    fn from(failure: StreamFailure) -> Self {
        TransportError::Stream {
            status: failure.status,
            body: failure.body,
            message: failure.message,
        }
    }
}
