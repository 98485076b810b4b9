//! Callback contract of a streaming channel.

use tokio::sync::mpsc;

use super::error::StreamError;

/// Receives the callbacks of one channel.
///
/// Per channel: any number of `on_chunk` calls in delivery order, followed
/// by at most one of `on_complete` or `on_error`. Nothing follows the
/// terminal callback. A cancelled channel gets no terminal callback.
pub trait StreamListener {
    fn on_chunk(&mut self, chunk: String);

    fn on_complete(&mut self);

    fn on_error(&mut self, error: StreamError);
}

/// Listener assembled from three closures.
pub struct Callbacks<C, D, E> {
    on_chunk: C,
    on_complete: Option<D>,
    on_error: Option<E>,
}

impl<C, D, E> Callbacks<C, D, E>
where
    C: FnMut(String),
    D: FnOnce(),
    E: FnOnce(StreamError),
{
    pub fn new(on_chunk: C, on_complete: D, on_error: E) -> Self {
        Self {
            on_chunk,
            on_complete: Some(on_complete),
            on_error: Some(on_error),
        }
    }
}

impl<C, D, E> StreamListener for Callbacks<C, D, E>
where
    C: FnMut(String),
    D: FnOnce(),
    E: FnOnce(StreamError),
{
    fn on_chunk(&mut self, chunk: String) {
        (self.on_chunk)(chunk);
    }

    fn on_complete(&mut self) {
        if let Some(on_complete) = self.on_complete.take() {
            on_complete();
        }
    }

    fn on_error(&mut self, error: StreamError) {
        if let Some(on_error) = self.on_error.take() {
            on_error(error);
        }
    }
}

/// Callback delivered as a value, for consumers that own the state being
/// updated and want to apply signals on their own task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSignal {
    Chunk(String),
    Complete,
    Error(StreamError),
}

impl StreamSignal {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamSignal::Chunk(_))
    }
}

/// Forwards every callback into a channel. A closed receiver drops signals.
impl StreamListener for mpsc::UnboundedSender<StreamSignal> {
    fn on_chunk(&mut self, chunk: String) {
        let _ = self.send(StreamSignal::Chunk(chunk));
    }

    fn on_complete(&mut self) {
        let _ = self.send(StreamSignal::Complete);
    }

    fn on_error(&mut self, error: StreamError) {
        let _ = self.send(StreamSignal::Error(error));
    }
}
