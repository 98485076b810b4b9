//! Streaming channel error types.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised while opening or reading a streaming channel.
///
/// Everything except [`StreamError::EmptyMessage`] and
/// [`StreamError::Open`] is delivered through
/// [`super::StreamListener::on_error`] and ends the channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("message must not be empty")]
    EmptyMessage,

    /// The request for the channel could not be built.
    #[error("failed to open stream: {0}")]
    Open(String),

    /// The backend refused the channel.
    #[error("stream request returned {0}")]
    Status(StatusCode),

    /// The backend answered with something other than an event stream.
    #[error("stream response has unexpected content type: {0}")]
    ContentType(String),

    /// Connection dropped or the body could not be read.
    #[error("stream transport failed: {0}")]
    Transport(String),

    /// The backend pushed a named `error` event.
    #[error("server reported an error: {0}")]
    Server(String),

    /// The backend closed the channel without a completion signal.
    #[error("stream ended before completion")]
    Ended,
}

impl From<reqwest_eventsource::Error> for StreamError {
    fn from(err: reqwest_eventsource::Error) -> Self {
        use reqwest_eventsource::Error;

        match err {
            Error::StreamEnded => StreamError::Ended,
            Error::InvalidStatusCode(status, _) => StreamError::Status(status),
            Error::InvalidContentType(value, _) => {
                StreamError::ContentType(value.to_str().unwrap_or("<binary>").to_string())
            }
            other => StreamError::Transport(other.to_string()),
        }
    }
}
