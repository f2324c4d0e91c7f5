//! API client: call construction, one-shot dispatch and stream sessions.
//!
//! Implementation details are split into submodules under `src/client/`.

pub mod builder;
pub mod core;
pub mod session;

pub use builder::ApiClientBuilder;
pub use core::{ApiClient, ApiResult};
pub use session::{CancelHandle, StreamSession};
