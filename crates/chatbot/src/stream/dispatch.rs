//! Per-channel callback dispatch guarded by a terminal gate.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;

use super::error::StreamError;
use super::event::{StreamEvent, StreamEventKind};
use super::listener::StreamListener;

thread_local! {
    /// Address of the gate whose listener is running on this thread, or 0.
    static DELIVERING: Cell<usize> = const { Cell::new(0) };
}

/// Closed flag shared by a channel's task and its handle.
///
/// Every callback runs under the gate's delivery lock after checking the
/// flag. Whoever flips the flag first owns the single terminal callback
/// (or, for cancellation, suppresses it).
#[derive(Debug, Default)]
pub(crate) struct TerminalGate {
    closed: AtomicBool,
    delivery: Mutex<()>,
}

impl TerminalGate {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the gate. Returns true only for the call that closed it.
    pub(crate) fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    /// Close the gate from outside the channel.
    ///
    /// Returns once no callback of this channel is running, so nothing is
    /// delivered after it. Called from inside one of this channel's own
    /// callbacks it returns at once; the dispatcher sees the closed flag
    /// before the next callback.
    pub(crate) fn cancel(&self) -> bool {
        let closed = self.close();
        if DELIVERING.get() != self.address() {
            drop(self.lock());
        }
        closed
    }

    /// Run `callback` unless the gate is closed. Returns whether it ran.
    fn deliver(&self, callback: impl FnOnce()) -> bool {
        let _guard = self.lock();
        if self.is_closed() {
            return false;
        }
        self.run(callback);
        true
    }

    /// Close the gate and run `callback` if this call closed it.
    fn deliver_terminal(&self, callback: impl FnOnce()) -> bool {
        let _guard = self.lock();
        if !self.close() {
            return false;
        }
        self.run(callback);
        true
    }

    fn run(&self, callback: impl FnOnce()) {
        let previous = DELIVERING.replace(self.address());
        callback();
        DELIVERING.set(previous);
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn address(&self) -> usize {
        self as *const Self as usize
    }
}

/// Whether the channel should keep reading after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Close,
}

/// Turns raw pushes into listener callbacks for one channel.
pub(crate) struct Dispatcher<L> {
    listener: L,
    gate: Arc<TerminalGate>,
    separator: String,
}

impl<L: StreamListener> Dispatcher<L> {
    pub(crate) fn new(listener: L, gate: Arc<TerminalGate>, separator: impl Into<String>) -> Self {
        Self {
            listener,
            gate,
            separator: separator.into(),
        }
    }

    /// Handle one server push.
    pub(crate) fn handle_message(&mut self, event: &str, data: &str) -> Flow {
        if self.gate.is_closed() {
            return Flow::Close;
        }
        match StreamEvent::parse(event, data) {
            Some(event) => self.handle_event(event),
            None => Flow::Continue,
        }
    }

    pub(crate) fn handle_event(&mut self, event: StreamEvent) -> Flow {
        match event.kind {
            StreamEventKind::Chunk => {
                if let Some(chunk) = event.chunk.and_then(|c| self.format_chunk(c, event.decoded)) {
                    let listener = &mut self.listener;
                    if !self.gate.deliver(|| listener.on_chunk(chunk)) {
                        return Flow::Close;
                    }
                }
                if event.is_last {
                    self.complete();
                    Flow::Close
                } else {
                    Flow::Continue
                }
            }
            StreamEventKind::Complete => {
                self.complete();
                Flow::Close
            }
            StreamEventKind::Error => {
                self.fail(StreamError::Server(event.chunk.unwrap_or_default()));
                Flow::Close
            }
        }
    }

    /// In word mode (non-empty separator) JSON chunks are single words split
    /// on whitespace by the backend: surrounding whitespace is dropped and the
    /// separator appended. Raw-text fallbacks are passed through untouched.
    fn format_chunk(&self, chunk: String, decoded: bool) -> Option<String> {
        if !decoded || self.separator.is_empty() {
            return Some(chunk);
        }
        let word = chunk.trim();
        if word.is_empty() {
            return None;
        }
        let mut text = String::with_capacity(word.len() + self.separator.len());
        text.push_str(word);
        text.push_str(&self.separator);
        Some(text)
    }

    /// Deliver `on_complete` unless a terminal callback already fired.
    pub(crate) fn complete(&mut self) -> bool {
        let listener = &mut self.listener;
        let delivered = self.gate.deliver_terminal(|| listener.on_complete());
        if !delivered {
            debug!("Dropping completion for closed channel");
        }
        delivered
    }

    /// Deliver `on_error` unless a terminal callback already fired.
    pub(crate) fn fail(&mut self, error: StreamError) -> bool {
        if self.gate.is_closed() {
            debug!("Dropping error for closed channel: {error}");
            return false;
        }
        let listener = &mut self.listener;
        self.gate.deliver_terminal(|| listener.on_error(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::listener::Callbacks;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct Recorder {
        chunks: Vec<String>,
        completed: usize,
        errors: Vec<StreamError>,
    }

    impl StreamListener for &mut Recorder {
        fn on_chunk(&mut self, chunk: String) {
            self.chunks.push(chunk);
        }

        fn on_complete(&mut self) {
            self.completed += 1;
        }

        fn on_error(&mut self, error: StreamError) {
            self.errors.push(error);
        }
    }

    fn dispatcher(recorder: &mut Recorder) -> (Dispatcher<&mut Recorder>, Arc<TerminalGate>) {
        let gate = Arc::new(TerminalGate::default());
        (Dispatcher::new(recorder, gate.clone(), " "), gate)
    }

    #[test]
    fn test_hello_scenario() {
        let mut recorder = Recorder::default();
        let (mut dispatcher, gate) = dispatcher(&mut recorder);

        assert_eq!(
            dispatcher.handle_message("chunk", r#"{"chunk":"Hi"}"#),
            Flow::Continue
        );
        assert_eq!(
            dispatcher.handle_message("chunk", r#"{"chunk":" there","isLast":true}"#),
            Flow::Close
        );
        assert!(gate.is_closed());
        drop(dispatcher);

        assert_eq!(recorder.chunks, vec!["Hi ", "there "]);
        assert_eq!(recorder.completed, 1);
        assert!(recorder.errors.is_empty());
    }

    #[test]
    fn test_chunks_accumulate_in_delivery_order() {
        let words = ["The", "quick", "brown", "fox", "jumps"];
        let mut recorder = Recorder::default();
        let (mut dispatcher, _gate) = dispatcher(&mut recorder);

        for word in words {
            let data = serde_json::json!({ "chunk": word }).to_string();
            assert_eq!(dispatcher.handle_message("chunk", &data), Flow::Continue);
        }
        assert_eq!(dispatcher.handle_message("complete", ""), Flow::Close);
        drop(dispatcher);

        assert_eq!(recorder.chunks.concat(), "The quick brown fox jumps ");
        assert_eq!(recorder.completed, 1);
    }

    #[test]
    fn test_malformed_payload_is_delivered_as_text() {
        let mut recorder = Recorder::default();
        let (mut dispatcher, _gate) = dispatcher(&mut recorder);

        assert_eq!(dispatcher.handle_message("message", "plain words"), Flow::Continue);
        drop(dispatcher);

        assert_eq!(recorder.chunks, vec!["plain words"]);
        assert_eq!(recorder.completed, 0);
        assert!(recorder.errors.is_empty());
    }

    #[test]
    fn test_nothing_after_completion() {
        let mut recorder = Recorder::default();
        let (mut dispatcher, _gate) = dispatcher(&mut recorder);

        dispatcher.handle_message("complete", "");
        assert_eq!(
            dispatcher.handle_message("chunk", r#"{"chunk":"late"}"#),
            Flow::Close
        );
        assert!(!dispatcher.fail(StreamError::Ended));
        assert!(!dispatcher.complete());
        drop(dispatcher);

        assert!(recorder.chunks.is_empty());
        assert_eq!(recorder.completed, 1);
        assert!(recorder.errors.is_empty());
    }

    #[test]
    fn test_error_then_completion_delivers_only_error() {
        let mut recorder = Recorder::default();
        let (mut dispatcher, _gate) = dispatcher(&mut recorder);

        dispatcher.handle_message("chunk", r#"{"chunk":"partial"}"#);
        assert!(dispatcher.fail(StreamError::Transport("reset".into())));
        assert_eq!(
            dispatcher.handle_message("chunk", r#"{"isLast":true}"#),
            Flow::Close
        );
        drop(dispatcher);

        assert_eq!(recorder.chunks, vec!["partial "]);
        assert_eq!(recorder.completed, 0);
        assert_eq!(recorder.errors, vec![StreamError::Transport("reset".into())]);
    }

    #[test]
    fn test_closed_gate_suppresses_everything() {
        let mut recorder = Recorder::default();
        let (mut dispatcher, gate) = dispatcher(&mut recorder);

        assert!(gate.close());
        assert_eq!(
            dispatcher.handle_message("chunk", r#"{"chunk":"Hi","isLast":true}"#),
            Flow::Close
        );
        assert!(!dispatcher.fail(StreamError::Ended));
        drop(dispatcher);

        assert!(recorder.chunks.is_empty());
        assert_eq!(recorder.completed, 0);
        assert!(recorder.errors.is_empty());
    }

    #[test]
    fn test_empty_separator_passes_chunks_verbatim() {
        let mut recorder = Recorder::default();
        let gate = Arc::new(TerminalGate::default());
        let mut dispatcher = Dispatcher::new(&mut recorder, gate, "");

        dispatcher.handle_message("chunk", r#"{"chunk":"Hel"}"#);
        dispatcher.handle_message("chunk", r#"{"chunk":"lo, wor"}"#);
        dispatcher.handle_message("chunk", r#"{"chunk":"ld","isLast":true}"#);
        drop(dispatcher);

        assert_eq!(recorder.chunks.concat(), "Hello, world");
        assert_eq!(recorder.completed, 1);
    }

    #[test]
    fn test_server_error_event_is_terminal() {
        let mut recorder = Recorder::default();
        let (mut dispatcher, _gate) = dispatcher(&mut recorder);

        assert_eq!(dispatcher.handle_message("error", "quota exceeded"), Flow::Close);
        drop(dispatcher);

        assert_eq!(
            recorder.errors,
            vec![StreamError::Server("quota exceeded".into())]
        );
    }

    #[test]
    fn test_cancel_waits_for_running_callback() {
        let gate = Arc::new(TerminalGate::default());
        let delivered = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));
        let (started_tx, started_rx) = std::sync::mpsc::channel();

        let count = delivered.clone();
        let done = finished.clone();
        let listener = Callbacks::new(
            move |_chunk: String| {
                count.fetch_add(1, Ordering::SeqCst);
                let _ = started_tx.send(());
                std::thread::sleep(Duration::from_millis(100));
                done.store(true, Ordering::SeqCst);
            },
            || {},
            |_error: StreamError| {},
        );
        let mut dispatcher = Dispatcher::new(listener, gate.clone(), " ");
        let worker = std::thread::spawn(move || {
            dispatcher.handle_message("chunk", r#"{"chunk":"first"}"#);
            dispatcher.handle_message("chunk", r#"{"chunk":"second"}"#)
        });

        started_rx.recv().unwrap();
        assert!(gate.cancel());
        // The running callback finished before cancel returned.
        assert!(finished.load(Ordering::SeqCst));

        assert_eq!(worker.join().unwrap(), Flow::Close);
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_from_inside_callback() {
        let gate = Arc::new(TerminalGate::default());
        let mut chunks = Vec::new();
        let inner = gate.clone();
        {
            let listener = Callbacks::new(
                |chunk: String| {
                    chunks.push(chunk);
                    inner.cancel();
                },
                || {},
                |_error: StreamError| {},
            );
            let mut dispatcher = Dispatcher::new(listener, gate.clone(), " ");

            assert_eq!(
                dispatcher.handle_message("chunk", r#"{"chunk":"first"}"#),
                Flow::Continue
            );
            assert_eq!(
                dispatcher.handle_message("chunk", r#"{"chunk":"second"}"#),
                Flow::Close
            );
            assert!(!dispatcher.complete());
        }

        assert_eq!(chunks, vec!["first "]);
    }

    #[test]
    fn test_mistyped_extra_field_still_completes() {
        let mut recorder = Recorder::default();
        let (mut dispatcher, _gate) = dispatcher(&mut recorder);

        assert_eq!(
            dispatcher.handle_message("chunk", r#"{"chunk":"Hi","isLast":true,"sessionId":7}"#),
            Flow::Close
        );
        drop(dispatcher);

        assert_eq!(recorder.chunks, vec!["Hi "]);
        assert_eq!(recorder.completed, 1);
    }
}
