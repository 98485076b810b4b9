//! The conversation state container.

use std::fmt;

use chatbot_protocol::{AgentType, ApiResponse, ConnectionStatus, HistoryMessage, UnknownVariant};
use chrono::{DateTime, NaiveDateTime, Utc};
use log::{debug, warn};

use super::models::{
    ConversationState, Message, MessageId, MessageUpdate, Role, UpdateOutcome,
};
use crate::i18n::Locale;

/// Agent label of locally generated failure notices.
pub const ERROR_AGENT: &str = "error";

/// Agent label of user messages.
pub const USER_AGENT: &str = "user";

/// Holds the conversation shown to the user.
///
/// All mutation goes through the named transitions below, each taking
/// `&mut self`, so there is exactly one writer at a time. Share it behind
/// whatever the host UI uses for single-threaded state.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    state: ConversationState,
    next_id: u64,
    locale: Locale,
    default_agent: String,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new(Locale::default())
    }
}

impl ConversationStore {
    pub fn new(locale: Locale) -> Self {
        Self::with_default_agent(locale, AgentType::Supervisor.code())
    }

    pub fn with_default_agent(locale: Locale, default_agent: impl Into<String>) -> Self {
        let default_agent = default_agent.into();
        Self {
            state: ConversationState {
                messages: Vec::new(),
                is_loading: false,
                connection_status: ConnectionStatus::Disconnected,
                session_id: None,
                current_agent: default_agent.clone(),
                agent_status: locale.idle_agent_status().to_string(),
            },
            next_id: 1,
            locale,
            default_agent,
        }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn messages(&self) -> &[Message] {
        &self.state.messages
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.state.messages.iter().find(|m| m.id == id)
    }

    pub fn is_loading(&self) -> bool {
        self.state.is_loading
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.state.connection_status
    }

    pub fn session_id(&self) -> Option<&str> {
        self.state.session_id.as_deref()
    }

    pub fn current_agent(&self) -> &str {
        &self.state.current_agent
    }

    pub fn agent_status(&self) -> &str {
        &self.state.agent_status
    }

    fn allocate_id(&mut self) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id += 1;
        id
    }

    fn push(&mut self, message: Message) -> Message {
        debug!(
            "Adding {} message {} ({})",
            message.role.as_str(),
            message.id,
            message.agent_type
        );
        self.state.messages.push(message.clone());
        message
    }

    pub fn add_user_message(&mut self, text: impl Into<String>) -> Message {
        let id = self.allocate_id();
        self.push(Message::new(id, Role::User, text.into(), USER_AGENT.to_string()))
    }

    /// Append a complete reply from a non-streaming turn.
    pub fn add_assistant_message(&mut self, response: &ApiResponse) -> Message {
        let id = self.allocate_id();
        let mut message = Message::new(
            id,
            Role::Assistant,
            response.message.clone(),
            response.agent_used.clone(),
        );
        message.metadata = Some(response.metadata.clone());
        message.thinking_process = response.thinking_process.clone();
        self.push(message)
    }

    /// Append an empty assistant message that a streaming turn will fill.
    pub fn add_streaming_message(&mut self, agent_type: impl Into<String>) -> Message {
        let id = self.allocate_id();
        let mut message = Message::new(id, Role::Assistant, String::new(), agent_type.into());
        message.streaming = true;
        self.push(message)
    }

    /// Append a terminal failure notice in the store's locale.
    pub fn add_error_message(&mut self, error: &dyn fmt::Display) -> Message {
        let id = self.allocate_id();
        let mut message = Message::new(
            id,
            Role::Assistant,
            self.locale.error_summary(error),
            ERROR_AGENT.to_string(),
        );
        message.error = true;
        self.push(message)
    }

    pub fn add_welcome_message(&mut self) -> Message {
        let id = self.allocate_id();
        let mut message = Message::new(
            id,
            Role::Assistant,
            self.locale.welcome().to_string(),
            self.default_agent.clone(),
        );
        message.welcome = true;
        self.push(message)
    }

    /// Merge the provided fields into a pending message.
    ///
    /// Unknown ids and messages that already finished are left untouched.
    pub fn update_streaming_message(&mut self, id: MessageId, update: MessageUpdate) -> UpdateOutcome {
        let Some(message) = self.state.messages.iter_mut().find(|m| m.id == id) else {
            debug!("Ignoring update for unknown message {id}");
            return UpdateOutcome::UnknownId;
        };

        if message.is_terminal() {
            debug!("Ignoring update for finished message {id}");
            return UpdateOutcome::Frozen;
        }

        if let Some(content) = update.content {
            message.content = content;
        }
        if let Some(streaming) = update.streaming {
            message.streaming = streaming;
        }
        if let Some(error) = update.error {
            message.error = error;
        }
        UpdateOutcome::Applied
    }

    /// Append a message built elsewhere. It is given a fresh id.
    pub fn add_message(&mut self, mut message: Message) -> Message {
        message.id = self.allocate_id();
        self.push(message)
    }

    /// Replace the whole message list, keeping its order. Every message is
    /// given a fresh id so ids stay unique across replacements.
    pub fn replace_messages(&mut self, messages: Vec<Message>) {
        self.state.messages.clear();
        for mut message in messages {
            message.id = self.allocate_id();
            self.state.messages.push(message);
        }
    }

    /// Replace the message list with a session history from the backend.
    ///
    /// Returns the number of messages loaded.
    pub fn load_history(&mut self, history: &[HistoryMessage]) -> usize {
        let mut messages = Vec::with_capacity(history.len());
        for entry in history {
            let role = match entry.role.as_str() {
                "user" => Role::User,
                "assistant" => Role::Assistant,
                other => {
                    warn!("Skipping history entry with role '{other}'");
                    continue;
                }
            };
            let agent_type = entry.agent_type.clone().unwrap_or_else(|| match role {
                Role::User => USER_AGENT.to_string(),
                Role::Assistant => self.default_agent.clone(),
            });
            let mut message = Message::new(MessageId(0), role, entry.content.clone(), agent_type);
            if let Some(timestamp) = entry.timestamp.as_deref().and_then(parse_timestamp) {
                message.timestamp = timestamp;
            }
            if !entry.metadata.is_empty() {
                message.metadata = Some(entry.metadata.clone());
            }
            messages.push(message);
        }
        self.replace_messages(messages);
        self.state.messages.len()
    }

    pub fn update_connection_status(&mut self, status: ConnectionStatus) {
        self.state.connection_status = status;
    }

    /// Text form of [`Self::update_connection_status`]; rejects labels that
    /// are not a connection status.
    pub fn update_connection_status_str(&mut self, status: &str) -> Result<(), UnknownVariant> {
        self.update_connection_status(status.parse()?);
        Ok(())
    }

    pub fn update_current_agent(&mut self, agent: impl Into<String>) {
        self.state.current_agent = agent.into();
    }

    pub fn update_is_loading(&mut self, is_loading: bool) {
        self.state.is_loading = is_loading;
    }

    pub fn update_session_id(&mut self, session_id: Option<String>) {
        self.state.session_id = session_id;
    }

    pub fn update_agent_status(&mut self, status: impl Into<String>) {
        self.state.agent_status = status.into();
    }

    /// Reset the conversation after the backend dropped the session.
    ///
    /// Connection status is kept; ids keep counting so they stay unique for
    /// the lifetime of the store.
    pub fn clear(&mut self) {
        self.state.messages.clear();
        self.state.is_loading = false;
        self.state.session_id = None;
        self.state.current_agent = self.default_agent.clone();
        self.state.agent_status = self.locale.idle_agent_status().to_string();
    }
}

/// Accept RFC 3339 and the zone-less ISO form Python emits.
fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
