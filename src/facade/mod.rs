//! Endpoint facade over [`crate::ApiClient`].
//!
//! The client core knows nothing about endpoints; this layer maps each Responses API
//! operation onto an outbound call and picks the matching dispatch mode.

pub mod responses;

pub use responses::ResponsesApi;
