//! Chat session controller.
//!
//! Wires the API clients to a [`ConversationStore`] and drives each turn.
//! The streaming channel runs on its own task and only forwards signals;
//! every store mutation happens here, on the caller's task.

use std::sync::Arc;

use chatbot_protocol::{ConnectionStatus, SessionResponse};
use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiError, ChatApi};
use crate::store::{ConversationStore, Message, MessageId, MessageUpdate};
use crate::stream::{StreamError, StreamHandle, StreamSignal, StreamingApiClient};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("message must not be empty")]
    EmptyMessage,

    #[error("no session id is known yet")]
    NoSession,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// How a streaming turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,
    Failed(StreamError),
    Cancelled,
}

/// Final state of a streaming turn.
#[derive(Debug, Clone)]
pub struct StreamTurn {
    /// The assistant message as it was left in the store.
    pub message: Message,
    pub outcome: TurnOutcome,
}

struct InFlightTurn {
    message_id: MessageId,
    handle: StreamHandle,
}

/// One conversation with the backend.
pub struct ChatSession {
    api: Arc<dyn ChatApi>,
    streamer: StreamingApiClient,
    store: ConversationStore,
    in_flight: Option<InFlightTurn>,
}

impl ChatSession {
    pub fn new(api: Arc<dyn ChatApi>, streamer: StreamingApiClient, store: ConversationStore) -> Self {
        Self {
            api,
            streamer,
            store,
            in_flight: None,
        }
    }

    pub fn api(&self) -> &dyn ChatApi {
        self.api.as_ref()
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ConversationStore {
        &mut self.store
    }

    pub fn session_id(&self) -> Option<&str> {
        self.store.session_id()
    }

    pub fn set_session_id(&mut self, session_id: impl Into<String>) {
        self.store.update_session_id(Some(session_id.into()));
    }

    /// Current session id, assigning a new one if none is known.
    pub fn ensure_session_id(&mut self) -> String {
        if let Some(session_id) = self.store.session_id() {
            return session_id.to_string();
        }
        let session_id = uuid::Uuid::new_v4().to_string();
        info!("Starting new chat session {session_id}");
        self.store.update_session_id(Some(session_id.clone()));
        session_id
    }

    /// True while a streaming turn holds an open channel.
    pub fn has_turn_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Check backend health and record the resulting connection status.
    pub async fn refresh_connection(&mut self) -> ConnectionStatus {
        self.store.update_connection_status(ConnectionStatus::Connecting);
        let status = match self.api.health_check().await {
            Ok(health) if health.is_healthy() => ConnectionStatus::Connected,
            Ok(health) => {
                warn!("Backend reports status '{}'", health.status);
                ConnectionStatus::Disconnected
            }
            Err(err) => {
                warn!("{err}");
                ConnectionStatus::Disconnected
            }
        };
        self.store.update_connection_status(status);
        status
    }

    /// Run a non-streaming turn.
    ///
    /// On failure an error notice is appended to the conversation and the
    /// error is returned for the caller to surface.
    pub async fn send_message(&mut self, text: &str) -> Result<Message, SessionError> {
        if text.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        self.abandon_in_flight();

        let session_id = self.ensure_session_id();
        self.store.add_user_message(text);
        self.store.update_is_loading(true);

        let result = self.api.send_message(text, &session_id).await;
        self.store.update_is_loading(false);

        match result {
            Ok(response) => {
                self.store.update_connection_status(ConnectionStatus::Connected);
                self.store.update_current_agent(response.agent_used.clone());
                Ok(self.store.add_assistant_message(&response))
            }
            Err(err) => {
                if err.is_connection_failure() {
                    self.store.update_connection_status(ConnectionStatus::Disconnected);
                }
                self.store.add_error_message(&err);
                Err(err.into())
            }
        }
    }

    /// Run a streaming turn, calling `on_update` each time the reply grows.
    ///
    /// Resolves when the channel completes, fails, or `cancel` fires. Stream
    /// failures are reported in the returned [`StreamTurn`]; only problems
    /// opening the channel are returned as errors.
    pub async fn stream_message<F>(
        &mut self,
        text: &str,
        cancel: &CancellationToken,
        mut on_update: F,
    ) -> Result<StreamTurn, SessionError>
    where
        F: FnMut(&Message),
    {
        if text.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        self.abandon_in_flight();

        let session_id = self.ensure_session_id();
        let locale = self.store.locale();
        self.store.add_user_message(text);
        let agent = self.store.current_agent().to_string();
        let pending = self.store.add_streaming_message(agent.clone());
        self.store.update_agent_status(locale.busy_agent_status(&agent));
        self.store.update_connection_status(ConnectionStatus::Connecting);
        self.store.update_is_loading(true);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = match self.streamer.stream_message(text, Some(&session_id), tx) {
            Ok(handle) => handle,
            Err(err) => {
                debug!("Could not open stream for message {}", pending.id);
                self.finish_turn(&pending, "", &TurnOutcome::Failed(err.clone()));
                return Err(err.into());
            }
        };
        self.in_flight = Some(InFlightTurn {
            message_id: pending.id,
            handle,
        });

        let mut buffer = String::new();
        let outcome = loop {
            let signal = tokio::select! {
                biased;
                _ = cancel.cancelled() => break TurnOutcome::Cancelled,
                signal = rx.recv() => signal,
            };

            match signal {
                Some(StreamSignal::Chunk(chunk)) => {
                    if buffer.is_empty() {
                        self.store.update_connection_status(ConnectionStatus::Connected);
                    }
                    buffer.push_str(&chunk);
                    self.store
                        .update_streaming_message(pending.id, MessageUpdate::content(buffer.as_str()));
                    if let Some(message) = self.store.message(pending.id) {
                        on_update(message);
                    }
                }
                Some(StreamSignal::Complete) => break TurnOutcome::Completed,
                Some(StreamSignal::Error(err)) => break TurnOutcome::Failed(err),
                // The channel task ended without a terminal callback.
                None => break TurnOutcome::Failed(StreamError::Ended),
            }
        };

        let turn = self.in_flight.take();
        if let Some(turn) = turn.as_ref().filter(|_| outcome == TurnOutcome::Cancelled) {
            turn.handle.cancel();
        }
        let message = self.finish_turn(&pending, &buffer, &outcome);
        if let Some(turn) = turn {
            turn.handle.finished().await;
        }

        on_update(&message);
        Ok(StreamTurn { message, outcome })
    }

    /// Move the pending message of a turn to its terminal phase.
    fn finish_turn(&mut self, pending: &Message, buffer: &str, outcome: &TurnOutcome) -> Message {
        let id = pending.id;
        let locale = self.store.locale();
        match outcome {
            TurnOutcome::Completed => {
                self.store.update_streaming_message(id, MessageUpdate::finalized());
                self.store.update_connection_status(ConnectionStatus::Connected);
            }
            TurnOutcome::Cancelled => {
                let content = format!("{buffer}{}", locale.cancelled_suffix());
                self.store
                    .update_streaming_message(id, MessageUpdate::finalized().with_content(content));
            }
            TurnOutcome::Failed(err) => {
                warn!("Streaming turn failed: {err}");
                let update = if buffer.is_empty() {
                    MessageUpdate::errored().with_content(locale.error_summary(err))
                } else {
                    MessageUpdate::errored()
                };
                self.store.update_streaming_message(id, update);
                if !buffer.is_empty() {
                    self.store.add_error_message(err);
                }
                self.store.update_connection_status(ConnectionStatus::Disconnected);
            }
        }
        self.store.update_is_loading(false);
        self.store.update_agent_status(locale.idle_agent_status());

        self.store
            .message(id)
            .cloned()
            .unwrap_or_else(|| pending.clone())
    }

    /// Cancel and finalize a turn whose driving future was dropped.
    fn abandon_in_flight(&mut self) {
        let Some(turn) = self.in_flight.take() else {
            return;
        };
        warn!("Abandoning unfinished turn for message {}", turn.message_id);
        turn.handle.cancel();
        if let Some(pending) = self.store.message(turn.message_id).cloned() {
            let buffer = pending.content.clone();
            self.finish_turn(&pending, &buffer, &TurnOutcome::Cancelled);
        }
    }

    /// Replace the local conversation with the backend's history.
    pub async fn load_history(&mut self) -> Result<usize, SessionError> {
        let session_id = self.session_id().ok_or(SessionError::NoSession)?.to_string();
        let history = self.api.get_chat_history(&session_id).await?;
        Ok(self.store.load_history(&history.messages))
    }

    /// Drop the session on the backend and reset the local conversation.
    pub async fn clear_session(&mut self) -> Result<SessionResponse, SessionError> {
        let session_id = self.session_id().ok_or(SessionError::NoSession)?.to_string();
        self.abandon_in_flight();
        let response = self.api.clear_session(&session_id).await?;
        info!("Cleared session {session_id}: {}", response.message);
        self.store.clear();
        Ok(response)
    }

    /// Trigger the backend's workflow self-test and record it as a turn.
    pub async fn test_workflow(&mut self, query: Option<&str>) -> Result<Message, SessionError> {
        let query = query.unwrap_or(crate::api::DEFAULT_WORKFLOW_QUERY);
        self.store.add_user_message(query);
        self.store.update_is_loading(true);
        let result = self.api.test_workflow(Some(query)).await;
        self.store.update_is_loading(false);
        match result {
            Ok(response) => Ok(self.store.add_assistant_message(&response)),
            Err(err) => {
                self.store.add_error_message(&err);
                Err(err.into())
            }
        }
    }
}
