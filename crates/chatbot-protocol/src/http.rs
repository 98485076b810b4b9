//! Request and response bodies of the JSON API under `/api`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of `POST /api/chat/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: String,
}

/// Free-form metadata attached to an agent reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Seconds the backend spent producing the reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_used: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MessageMetadata {
    pub fn is_empty(&self) -> bool {
        self.processing_time.is_none() && self.agent_used.is_none() && self.extra.is_empty()
    }
}

/// Reply to a non-streaming chat turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub message: String,
    pub agent_used: String,

    #[serde(default)]
    pub metadata: MessageMetadata,

    /// Intermediate reasoning steps, shape decided by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_process: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: String,
    #[serde(default)]
    pub timestamp: String,
}

impl HealthCheckResponse {
    pub fn is_healthy(&self) -> bool {
        matches!(self.status.as_str(), "ok" | "OK" | "healthy" | "UP")
    }
}

/// One stored turn as returned by the history endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    #[serde(default)]
    pub metadata: MessageMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatHistoryResponse {
    pub messages: Vec<HistoryMessage>,
    pub session_id: String,
}

/// Reply to `DELETE /api/chat/session/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResponse {
    pub message: String,
    #[serde(default)]
    pub session_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSessionsResponse {
    #[serde(alias = "active_sessions")]
    pub sessions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInfoResponse {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub agents: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_api_response_without_metadata() {
        let response: ApiResponse =
            serde_json::from_value(json!({"message": "hello", "agent_used": "general"})).unwrap();
        assert_eq!(response.agent_used, "general");
        assert!(response.metadata.is_empty());
        assert!(response.thinking_process.is_none());
    }

    #[test]
    fn test_metadata_keeps_unknown_keys() {
        let metadata: MessageMetadata = serde_json::from_value(json!({
            "processing_time": 1.5,
            "sources": ["a.md"]
        }))
        .unwrap();
        assert_eq!(metadata.processing_time, Some(1.5));
        assert_eq!(metadata.extra["sources"], json!(["a.md"]));

        let back = serde_json::to_value(&metadata).unwrap();
        assert_eq!(back, json!({"processing_time": 1.5, "sources": ["a.md"]}));
    }

    #[test]
    fn test_active_sessions_accepts_backend_alias() {
        let sessions: ActiveSessionsResponse =
            serde_json::from_value(json!({"active_sessions": ["s1", "s2"], "total_count": 2}))
                .unwrap();
        assert_eq!(sessions.sessions, vec!["s1", "s2"]);
    }

    #[test]
    fn test_health_status_variants() {
        let health = HealthCheckResponse {
            status: "healthy".into(),
            timestamp: String::new(),
        };
        assert!(health.is_healthy());
        let health = HealthCheckResponse {
            status: "degraded".into(),
            timestamp: String::new(),
        };
        assert!(!health.is_healthy());
    }
}
