//! Decoding of server pushes into [`StreamEvent`]s.

use chatbot_protocol::{CHUNK_EVENT, COMPLETE_EVENT, DEFAULT_EVENT, StreamPayload};
use log::{debug, trace};
use serde_json::Value;

/// Named event some backends push before dropping a failed turn.
pub const ERROR_EVENT: &str = "error";

/// What a single server push means for the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEventKind {
    Chunk,
    Complete,
    Error,
}

/// A decoded server push. Transient: the store never sees these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub kind: StreamEventKind,
    /// Text fragment for `Chunk` events, or the reason for `Error` events.
    pub chunk: Option<String>,
    /// Set when the payload carried `"isLast": true`.
    pub is_last: bool,
    /// False when the payload was not JSON and `chunk` holds the raw text.
    pub decoded: bool,
}

impl StreamEvent {
    fn complete() -> Self {
        Self {
            kind: StreamEventKind::Complete,
            chunk: None,
            is_last: true,
            decoded: true,
        }
    }

    fn error(reason: impl Into<String>) -> Self {
        Self {
            kind: StreamEventKind::Error,
            chunk: Some(reason.into()),
            is_last: true,
            decoded: true,
        }
    }

    /// Decode one push by event name and data.
    ///
    /// Returns `None` for events the channel does not act on. Payloads that
    /// are not a JSON object fall back to plain text.
    pub fn parse(event: &str, data: &str) -> Option<Self> {
        match event {
            "" | DEFAULT_EVENT | CHUNK_EVENT => Some(Self::parse_payload(data)),
            COMPLETE_EVENT => Some(Self::complete()),
            ERROR_EVENT => Some(Self::error(if data.trim().is_empty() {
                "server reported an error"
            } else {
                data
            })),
            other => {
                debug!("Ignoring stream event '{other}'");
                None
            }
        }
    }

    fn parse_payload(data: &str) -> Self {
        let payload = match serde_json::from_str::<Value>(data) {
            Ok(value) => StreamPayload::from_value(&value),
            Err(err) => {
                trace!("Stream payload is not JSON, delivering as text: {err}");
                None
            }
        };

        match payload {
            Some(payload) => Self {
                kind: StreamEventKind::Chunk,
                is_last: payload.is_last(),
                chunk: payload.chunk.filter(|chunk| !chunk.is_empty()),
                decoded: true,
            },
            None => Self {
                kind: StreamEventKind::Chunk,
                chunk: Some(data.to_string()).filter(|text| !text.is_empty()),
                is_last: false,
                decoded: false,
            },
        }
    }
}
