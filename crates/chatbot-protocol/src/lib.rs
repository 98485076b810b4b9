//! Wire types for the multi-agent chatbot service.
//!
//! Two transports share these types:
//!
//! ```text
//! Client --[HTTP JSON: /api/...]---------------> Backend
//! Client <--[SSE: /chatbot/chat/stream]--------- Backend (chunk / complete events)
//! ```
//!
//! The backend owns the agents and the conversation history. The client only
//! renders what it is sent and keeps a local copy of the current conversation.

pub mod agents;
pub mod http;
pub mod stream;

pub use agents::{AgentType, ConnectionStatus, UnknownVariant};
pub use http::{
    ActiveSessionsResponse, ApiResponse, ChatHistoryResponse, ChatRequest, HealthCheckResponse,
    HistoryMessage, MessageMetadata, ServiceInfoResponse, SessionResponse,
};
pub use stream::{CHUNK_EVENT, COMPLETE_EVENT, DEFAULT_EVENT, StreamPayload};
