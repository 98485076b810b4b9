//! Conversation data model.

use std::fmt;

use chatbot_protocol::{ConnectionStatus, MessageMetadata};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Locally generated message identifier, monotonic within a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// Lifecycle of a message.
///
/// `Pending` is the only state that accepts updates; the other two are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagePhase {
    Pending,
    Finalized,
    Errored,
}

/// One entry of the conversation as displayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Label of the agent that produced the message (`user` for user input,
    /// `error` for locally generated failure notices).
    pub agent_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_process: Option<Value>,
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub streaming: bool,
    /// Greeting inserted by the client, not part of the backend history.
    #[serde(default)]
    pub welcome: bool,
}

impl Message {
    pub(crate) fn new(id: MessageId, role: Role, content: String, agent_type: String) -> Self {
        Self {
            id,
            role,
            content,
            timestamp: Utc::now(),
            agent_type,
            metadata: None,
            thinking_process: None,
            error: false,
            streaming: false,
            welcome: false,
        }
    }

    pub fn phase(&self) -> MessagePhase {
        if self.streaming {
            MessagePhase::Pending
        } else if self.error {
            MessagePhase::Errored
        } else {
            MessagePhase::Finalized
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase() != MessagePhase::Pending
    }
}

/// Partial update applied by
/// [`super::ConversationStore::update_streaming_message`].
///
/// `content` replaces the whole buffer, so replaying an update is harmless.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageUpdate {
    pub content: Option<String>,
    pub streaming: Option<bool>,
    pub error: Option<bool>,
}

impl MessageUpdate {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    /// Mark the message finished.
    pub fn finalized() -> Self {
        Self {
            streaming: Some(false),
            ..Self::default()
        }
    }

    /// Mark the message finished with an error.
    pub fn errored() -> Self {
        Self {
            streaming: Some(false),
            error: Some(true),
            ..Self::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// Result of a streaming update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    /// No message with that id; nothing changed.
    UnknownId,
    /// The message already reached a terminal phase; nothing changed.
    Frozen,
}

/// Everything the UI renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    /// Display order; never reordered.
    pub messages: Vec<Message>,
    pub is_loading: bool,
    pub connection_status: ConnectionStatus,
    pub session_id: Option<String>,
    pub current_agent: String,
    pub agent_status: String,
}
