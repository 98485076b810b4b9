//! Request/response client error types.

use reqwest::StatusCode;
use thiserror::Error;

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors returned by [`super::ApiClient`].
///
/// Every variant names the operation that failed so the message can be shown
/// to the user as-is ("Failed to send message: ...").
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request could not be sent or no response arrived.
    #[error("{operation}: {source}")]
    Request {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The backend answered with a non-success status.
    #[error("{operation}: server returned {status}{}", format_body(.body))]
    Status {
        operation: &'static str,
        status: StatusCode,
        body: String,
    },

    /// The response body did not match the expected shape.
    #[error("{operation}: failed to parse response: {message}")]
    Parse {
        operation: &'static str,
        message: String,
    },

    /// The HTTP client could not be constructed.
    #[error("Failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl ApiError {
    /// HTTP status of the failed request, if the backend answered.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Request { source, .. } => source.status(),
            _ => None,
        }
    }

    /// True when the backend could not be reached at all.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, ApiError::Request { source, .. } if source.is_connect() || source.is_timeout())
    }
}

fn format_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(" ({})", truncate(trimmed, 200))
    }
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
