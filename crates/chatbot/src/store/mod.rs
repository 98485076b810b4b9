//! Client-side conversation state.

mod models;
mod store;

pub use models::{
    ConversationState, Message, MessageId, MessagePhase, MessageUpdate, Role, UpdateOutcome,
};
pub use store::{ConversationStore, ERROR_AGENT, USER_AGENT};
