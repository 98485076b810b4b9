//! Streaming turns over server-sent events.
//!
//! One channel per outgoing message. A channel decodes pushes into
//! [`StreamEvent`]s and reports them through a [`StreamListener`]:
//!
//! ```text
//! on_chunk* (on_complete | on_error)?
//! ```
//!
//! A shared closed flag guarantees a single terminal callback even when a
//! completion and a transport error race, and lets [`StreamHandle::cancel`]
//! silence a channel from outside.

mod client;
mod dispatch;
mod error;
mod event;
mod listener;

pub use client::{
    DEFAULT_CHUNK_SEPARATOR, STREAM_PATH, StreamConfig, StreamHandle, StreamingApiClient,
};
pub use error::StreamError;
pub use event::{ERROR_EVENT, StreamEvent, StreamEventKind};
pub use listener::{Callbacks, StreamListener, StreamSignal};
