//! # responses-client
//!
//! Responses API 的异步 Rust 客户端：一次性请求、SSE 流式事件、宽松 JSON 解码与拦截器链。
//!
//! An async client for the Responses API: one-shot calls, server-sent event streams,
//! lenient JSON decoding and an interceptor chain around every step.
//!
//! ## Overview
//!
//! Every call flows through the same pipeline:
//!
//! caller → [`ApiClient`] → interceptors (request) → [`transport::Transport`] →
//! interceptors (response / stream chunk) → [`lenient`] decoder → typed value or event.
//!
//! - **One-shot calls** return [`ApiResult`]: the payload, or the typed [`types::ApiError`]
//!   the server answered with. Anything else the server sends back is an [`Error`].
//! - **Streams** return a [`StreamSession`], a cancellable `futures::Stream` fed by one
//!   producer task per session.
//! - **Lenient decoding** fills in fields that real senders omit (mostly in partial
//!   objects carried by stream events) before strict serde parsing.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use responses_client::types::{Event, Request};
//! use responses_client::{ApiClient, ResponsesApi};
//!
//! #[tokio::main]
//! async fn main() -> responses_client::Result<()> {
//!     let api = ResponsesApi::new(ApiClient::builder().auth_token("sk-...").build()?);
//!
//!     let request = Request::new("gpt-4.1", "Tell me a joke.");
//!     let mut session = api.stream(&request).await?;
//!     while let Some(event) = session.next().await {
//!         if let Event::OutputTextDelta { delta, .. } = event? {
//!             print!("{delta}");
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`client`] | `ApiClient`, its builder and stream sessions |
//! | [`facade`] | `ResponsesApi`, one method per endpoint |
//! | [`interceptors`] | Hook trait, chain and the bundled interceptors |
//! | [`lenient`] | Default-filling JSON normalizer |
//! | [`transport`] | Transport trait, reqwest transport and SSE framing |
//! | [`types`] | Request, response and event shapes |

pub mod client;
pub mod facade;
pub mod interceptors;
pub mod lenient;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use client::{ApiClient, ApiClientBuilder, ApiResult, CancelHandle, StreamSession};
pub use facade::ResponsesApi;
pub use interceptors::{HeaderInterceptor, Interceptor, LoggingInterceptor};

use futures::Stream;
use std::pin::Pin;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// A pinned, boxed stream of fallible items.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = Result<T>> + Send + 'a>>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
