//! Interceptor hooks for application-layer cross-cutting concerns.
//!
//! 拦截器：在请求、响应、流式分片、流式事件和终止错误五个点上观察或改写数据。
//!
//! - Hooks are synchronous and run in registration order; each receives the output of
//!   the previous interceptor.
//! - Every hook has a pass-through default, so an interceptor only overrides what it needs.
//! - A hook returning `Err` is treated as a defect and aborts the call or stream session
//!   with [`Error::Interceptor`].

use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::error::BoxError;
use crate::transport::{OutboundCall, RawResponse};
use crate::{Error, Result};

/// Return type of the transforming hooks.
pub type HookResult<T> = std::result::Result<T, BoxError>;

/// What the error hook sees about a terminal failure.
#[derive(Debug, Clone, Copy)]
pub struct ErrorSite<'a> {
    pub call: &'a OutboundCall,
    /// HTTP status, when the server answered.
    pub status: Option<u16>,
    /// Raw body attached to the failure, if any.
    pub body: Option<&'a [u8]>,
    pub message: &'a str,
}

/// Interceptor trait for logging, auditing, header injection and similar concerns.
pub trait Interceptor: Send + Sync {
    /// Label used in [`Error::Interceptor`] and logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Called before dispatch. The returned call is what the transport sees.
    fn on_request(&self, call: OutboundCall) -> HookResult<OutboundCall> {
        Ok(call)
    }

    /// Called with the complete response of a one-shot call; may replace status or body.
    fn on_response(&self, _call: &OutboundCall, response: RawResponse) -> HookResult<RawResponse> {
        Ok(response)
    }

    /// Called with the data bytes of each stream frame; the result is what gets decoded.
    fn on_stream_chunk(&self, _call: &OutboundCall, chunk: Bytes) -> HookResult<Bytes> {
        Ok(chunk)
    }

    /// Called with the text of each stream frame. Observation only: the result is
    /// passed to the next interceptor but never decoded.
    fn on_stream_event(&self, _call: &OutboundCall, event: String) -> HookResult<String> {
        Ok(event)
    }

    /// Called on terminal failures.
    fn on_error(&self, _site: &ErrorSite<'_>) {}
}

/// Ordered, immutable list of interceptors shared by a client and its sessions.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
}

impl InterceptorChain {
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self {
            interceptors: interceptors.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub fn apply_request(&self, mut call: OutboundCall) -> Result<OutboundCall> {
        for ic in self.interceptors.iter() {
            call = ic
                .on_request(call)
                .map_err(|e| Error::interceptor(ic.name(), e))?;
        }
        Ok(call)
    }

    pub fn apply_response(&self, call: &OutboundCall, mut response: RawResponse) -> Result<RawResponse> {
        for ic in self.interceptors.iter() {
            response = ic
                .on_response(call, response)
                .map_err(|e| Error::interceptor(ic.name(), e))?;
        }
        Ok(response)
    }

    pub fn apply_stream_chunk(&self, call: &OutboundCall, mut chunk: Bytes) -> Result<Bytes> {
        for ic in self.interceptors.iter() {
            chunk = ic
                .on_stream_chunk(call, chunk)
                .map_err(|e| Error::interceptor(ic.name(), e))?;
        }
        Ok(chunk)
    }

    /// Runs the event hooks. The final text is dropped.
    pub fn observe_stream_event(&self, call: &OutboundCall, mut event: String) -> Result<()> {
        for ic in self.interceptors.iter() {
            event = ic
                .on_stream_event(call, event)
                .map_err(|e| Error::interceptor(ic.name(), e))?;
        }
        Ok(())
    }

    pub fn notify_error(&self, site: &ErrorSite<'_>) {
        for ic in self.interceptors.iter() {
            ic.on_error(site);
        }
    }
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.interceptors.iter().map(|ic| ic.name()))
            .finish()
    }
}

/// A logging interceptor backed by `tracing`. Bodies are never logged.
#[derive(Debug, Clone, Default)]
pub struct LoggingInterceptor;

impl Interceptor for LoggingInterceptor {
    fn name(&self) -> &str {
        "logging"
    }

    fn on_request(&self, call: OutboundCall) -> HookResult<OutboundCall> {
        debug!(target: "responses_client::http", method = %call.method, path = call.path(), "sending request");
        Ok(call)
    }

    fn on_response(&self, call: &OutboundCall, response: RawResponse) -> HookResult<RawResponse> {
        debug!(
            target: "responses_client::http",
            method = %call.method,
            path = call.path(),
            http_status = response.status,
            body_len = response.body.len(),
            "response received"
        );
        Ok(response)
    }

    fn on_stream_chunk(&self, call: &OutboundCall, chunk: Bytes) -> HookResult<Bytes> {
        trace!(target: "responses_client::http", path = call.path(), len = chunk.len(), "stream chunk");
        Ok(chunk)
    }

    fn on_error(&self, site: &ErrorSite<'_>) {
        debug!(
            target: "responses_client::http",
            path = site.call.path(),
            http_status = ?site.status,
            error = site.message,
            "request error"
        );
    }
}

/// Adds a fixed header to every outbound call.
#[derive(Debug, Clone)]
pub struct HeaderInterceptor {
    name: String,
    value: String,
}

impl HeaderInterceptor {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl Interceptor for HeaderInterceptor {
    fn name(&self) -> &str {
        "header"
    }

    fn on_request(&self, call: OutboundCall) -> HookResult<OutboundCall> {
        call.header(&self.name, &self.value).map_err(Into::into)
    }
}
