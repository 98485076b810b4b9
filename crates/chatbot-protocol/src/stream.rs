//! Server-push payloads for the streaming chat endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name the event source assigns to pushes without an `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// Named event carrying a [`StreamPayload`].
pub const CHUNK_EVENT: &str = "chunk";

/// Named event with no payload that ends the turn.
pub const COMPLETE_EVENT: &str = "complete";

/// JSON body of a `chunk` (or unnamed) event.
///
/// The backend also sends `sessionId` and `agentType`; they are kept when
/// present but the client only acts on `chunk` and `isLast`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_last: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
}

impl StreamPayload {
    /// True only for an explicit `"isLast": true`.
    pub fn is_last(&self) -> bool {
        self.is_last == Some(true)
    }

    /// Read the fields of a decoded JSON object one by one.
    ///
    /// A field with an unexpected type is treated as absent and does not
    /// affect the others. Returns `None` when `value` is not an object.
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let text = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            chunk: text("chunk"),
            is_last: object.get("isLast").and_then(Value::as_bool),
            session_id: text("sessionId"),
            agent_type: text("agentType"),
        })
    }
}
