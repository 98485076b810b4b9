//! Agent labels and connection status shared by client and backend.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when a label does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// Specialist agents the backend routes a turn to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    /// Classifies the request and picks a specialist.
    Supervisor,
    /// Answers from the internal document index.
    Rag,
    /// Writes and runs code.
    Code,
    /// Searches the public web.
    Search,
    /// Small talk and general questions.
    General,
}

impl AgentType {
    pub const ALL: [AgentType; 5] = [
        AgentType::Supervisor,
        AgentType::Rag,
        AgentType::Code,
        AgentType::Search,
        AgentType::General,
    ];

    pub fn code(self) -> &'static str {
        match self {
            AgentType::Supervisor => "supervisor",
            AgentType::Rag => "rag",
            AgentType::Code => "code",
            AgentType::Search => "search",
            AgentType::General => "general",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            AgentType::Supervisor => "🎯",
            AgentType::Rag => "📚",
            AgentType::Code => "💻",
            AgentType::Search => "🔍",
            AgentType::General => "💬",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            AgentType::Supervisor => "Analyses intent and selects the right agent",
            AgentType::Rag => "Searches internal documents",
            AgentType::Code => "Generates and runs code",
            AgentType::Search => "Searches the internet",
            AgentType::General => "General conversation and Q&A",
        }
    }

    /// Emoji for a free-form agent label, falling back to a robot for
    /// labels the client does not know (`user`, `error`, new agents).
    pub fn emoji_for_label(label: &str) -> &'static str {
        label.parse::<AgentType>().map(AgentType::emoji).unwrap_or("🤖")
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for AgentType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentType::ALL
            .into_iter()
            .find(|agent| agent.code() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "agent type",
                value: s.to_string(),
            })
    }
}

/// Reachability of the backend as last observed by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Connecting,
    #[default]
    Disconnected,
}

impl ConnectionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connected" => Ok(ConnectionStatus::Connected),
            "connecting" => Ok(ConnectionStatus::Connecting),
            "disconnected" => Ok(ConnectionStatus::Disconnected),
            other => Err(UnknownVariant {
                kind: "connection status",
                value: other.to_string(),
            }),
        }
    }
}
