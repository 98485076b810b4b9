//! Client for the multi-agent chatbot service.
//!
//! - [`stream`]: one server-sent-events channel per chat turn, surfaced as
//!   `on_chunk* (on_complete | on_error)` callbacks.
//! - [`store`]: the conversation as the UI shows it, mutated only through
//!   named transitions.
//! - [`session`]: drives turns, owning the store and both clients.
//! - [`api`]: the request/response endpoints.

pub mod api;
pub mod i18n;
pub mod session;
pub mod settings;
pub mod store;
pub mod stream;

pub use api::{ApiClient, ApiError, ChatApi};
pub use i18n::Locale;
pub use session::{ChatSession, SessionError, StreamTurn, TurnOutcome};
pub use store::{ConversationStore, Message, MessageId, MessageUpdate, Role, UpdateOutcome};
pub use stream::{
    Callbacks, StreamConfig, StreamError, StreamHandle, StreamListener, StreamSignal,
    StreamingApiClient,
};
