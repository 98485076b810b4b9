//! Streaming chat client built on server-sent events.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use log::{debug, trace, warn};
use reqwest::Client;
use reqwest::header::ACCEPT;
use reqwest_eventsource::{Event, EventSource, retry};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::dispatch::{Dispatcher, Flow, TerminalGate};
use super::error::StreamError;
use super::listener::StreamListener;

/// Path of the streaming endpoint, relative to the base URL.
pub const STREAM_PATH: &str = "/chatbot/chat/stream";

/// Separator appended to each decoded chunk.
pub const DEFAULT_CHUNK_SEPARATOR: &str = " ";

/// Settings of a [`StreamingApiClient`].
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Base URL of the backend (e.g., "http://localhost:8080").
    pub base_url: String,
    /// Appended to every JSON chunk; empty passes chunks through verbatim.
    pub chunk_separator: String,
    /// Time allowed to establish the HTTP connection. Reading the body has
    /// no deadline: a turn lasts as long as the backend keeps pushing.
    pub connect_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            chunk_separator: DEFAULT_CHUNK_SEPARATOR.to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Opens one server-push channel per chat turn.
#[derive(Debug, Clone)]
pub struct StreamingApiClient {
    client: Client,
    config: StreamConfig,
}

impl StreamingApiClient {
    pub fn new(config: StreamConfig) -> Result<Self, StreamError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| StreamError::Open(format!("failed to create HTTP client: {e}")))?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, mut config: StreamConfig) -> Self {
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Self { client, config }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Address of the channel for one turn. The session parameter is left
    /// out when no session is known yet.
    pub fn stream_url(&self, message: &str, session_id: Option<&str>) -> String {
        let mut url = format!(
            "{}{}?message={}",
            self.config.base_url,
            STREAM_PATH,
            urlencoding::encode(message)
        );
        if let Some(session_id) = session_id {
            url.push_str("&sessionId=");
            url.push_str(&urlencoding::encode(session_id));
        }
        url
    }

    /// Open a channel for `message` and deliver its events to `listener`.
    ///
    /// Returns as soon as the channel task is spawned; must be called from
    /// within a tokio runtime. Transport failures are terminal: there is no
    /// reconnect, the caller starts a new turn to retry.
    pub fn stream_message<L>(
        &self,
        message: &str,
        session_id: Option<&str>,
        listener: L,
    ) -> Result<StreamHandle, StreamError>
    where
        L: StreamListener + Send + 'static,
    {
        if message.trim().is_empty() {
            return Err(StreamError::EmptyMessage);
        }

        let url = self.stream_url(message, session_id);
        debug!("Opening stream channel at {url}");

        let request = self.client.get(&url).header(ACCEPT, "text/event-stream");
        let mut source = EventSource::new(request).map_err(|e| StreamError::Open(e.to_string()))?;
        source.set_retry_policy(Box::new(retry::Never));

        let gate = Arc::new(TerminalGate::default());
        let cancel = CancellationToken::new();
        let dispatcher =
            Dispatcher::new(listener, gate.clone(), self.config.chunk_separator.clone());

        let span = tracing::info_span!("chat_stream", session_id = session_id.unwrap_or("-"));
        let task = tokio::spawn(run_channel(source, dispatcher, cancel.clone()).instrument(span));

        Ok(StreamHandle { gate, cancel, task })
    }
}

/// Read the channel until a terminal event, an error, or cancellation.
async fn run_channel<L: StreamListener>(
    mut source: EventSource,
    mut dispatcher: Dispatcher<L>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Stream channel cancelled");
                break;
            }
            next = source.next() => next,
        };

        match next {
            Some(Ok(Event::Open)) => {
                debug!("Stream channel opened");
            }
            Some(Ok(Event::Message(message))) => {
                trace!(
                    "Stream event='{}' data={}",
                    message.event,
                    preview(&message.data)
                );
                if dispatcher.handle_message(&message.event, &message.data) == Flow::Close {
                    break;
                }
            }
            Some(Err(err)) => {
                let error = StreamError::from(err);
                warn!("Stream channel failed: {error}");
                dispatcher.fail(error);
                break;
            }
            None => {
                dispatcher.fail(StreamError::Ended);
                break;
            }
        }
    }

    source.close();
}

fn preview(data: &str) -> &str {
    match data.char_indices().nth(200) {
        Some((idx, _)) => &data[..idx],
        None => data,
    }
}

/// Handle to a running channel.
///
/// Dropping the handle leaves the channel running; call
/// [`StreamHandle::cancel`] to abort it.
#[derive(Debug)]
pub struct StreamHandle {
    gate: Arc<TerminalGate>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl StreamHandle {
    /// Close the channel and suppress every later callback, including the
    /// terminal one. Waits for a callback that is already running on another
    /// thread, so none fires after this returns. Idempotent.
    pub fn cancel(&self) {
        if self.gate.cancel() {
            debug!("Cancelling open stream channel");
        }
        self.cancel.cancel();
    }

    /// True once a terminal callback fired or the channel was cancelled.
    pub fn is_closed(&self) -> bool {
        self.gate.is_closed()
    }

    /// Wait for the channel task to release the connection.
    pub async fn finished(self) {
        if let Err(err) = self.task.await {
            warn!("Stream channel task failed: {err}");
        }
    }
}
