//! Request/response API client.
//!
//! Covers every non-streaming endpoint of the backend. Streaming turns go
//! through [`crate::stream`].

mod client;
mod error;

pub use client::{ApiClient, ChatApi, DEFAULT_TIMEOUT, DEFAULT_WORKFLOW_QUERY};
pub use error::{ApiError, ApiResult};
