//! API client integration tests.

use reqwest::StatusCode;

use chatbot::{ApiClient, ApiError, ChatApi};

mod common;
use common::{spawn_backend, unreachable_base_url};

#[tokio::test]
async fn test_health_endpoints() {
    let server = spawn_backend().await;
    let api = ApiClient::new(&server.base_url).unwrap();

    let health = api.health_check().await.unwrap();
    assert_eq!(health.status, "ok");
    assert!(health.is_healthy());

    let chat = api.chat_health_check().await.unwrap();
    assert!(chat.is_healthy());
    assert_eq!(chat.timestamp, "");
}

#[tokio::test]
async fn test_send_message_posts_session() {
    let server = spawn_backend().await;
    let api = ApiClient::new(format!("{}/", server.base_url)).unwrap();

    let response = api.send_message("what is rust?", "s1").await.unwrap();
    assert_eq!(response.message, "echo: what is rust?");
    assert_eq!(response.agent_used, "code");
    assert_eq!(response.metadata.processing_time, Some(0.5));
    assert_eq!(response.metadata.extra["confidence"], 0.9);
    assert_eq!(response.session_id.as_deref(), Some("s1"));

    let requests = server.recorded.chat_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].session_id, "s1");
}

#[tokio::test]
async fn test_server_error_names_operation() {
    let server = spawn_backend().await;
    let api = ApiClient::new(&server.base_url).unwrap();

    let err = api.send_message("explode", "s1").await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert!(!err.is_connection_failure());
    assert_eq!(
        err.to_string(),
        "Failed to send message: server returned 500 Internal Server Error (internal failure)"
    );
}

#[tokio::test]
async fn test_unexpected_body_is_parse_error() {
    let server = spawn_backend().await;
    let api = ApiClient::new(&server.base_url).unwrap();

    let err = api.send_message("garbage", "s1").await.unwrap_err();
    assert!(matches!(
        err,
        ApiError::Parse {
            operation: "Failed to send message",
            ..
        }
    ));
}

#[tokio::test]
async fn test_unreachable_backend_is_connection_failure() {
    let api = ApiClient::new(unreachable_base_url().await).unwrap();

    let err = api.health_check().await.unwrap_err();
    assert!(err.is_connection_failure());
    assert!(err.to_string().starts_with("Health check failed: "));
}

#[tokio::test]
async fn test_history_and_clear_encode_session_id() {
    let server = spawn_backend().await;
    let api = ApiClient::new(&server.base_url).unwrap();

    let history = api.get_chat_history("s1").await.unwrap();
    assert_eq!(history.session_id, "s1");
    assert_eq!(history.messages.len(), 3);
    assert_eq!(history.messages[2].agent_type.as_deref(), Some("general"));

    let empty = api.get_chat_history("a b").await.unwrap();
    assert_eq!(empty.session_id, "a b");
    assert!(empty.messages.is_empty());

    let cleared = api.clear_session("a/b").await.unwrap();
    assert_eq!(cleared.message, "Session cleared");
    assert_eq!(server.recorded.cleared(), vec!["a/b"]);
}

#[tokio::test]
async fn test_sessions_and_service_info() {
    let server = spawn_backend().await;
    let api = ApiClient::new(&server.base_url).unwrap();

    let sessions = api.get_active_sessions().await.unwrap();
    assert_eq!(sessions.sessions, vec!["s1", "s2"]);

    let info = api.get_service_info().await.unwrap();
    assert_eq!(info.version, "1.0.0");
    assert_eq!(info.agents.len(), 5);
}

#[tokio::test]
async fn test_workflow_uses_default_query() {
    let server = spawn_backend().await;
    let api = ApiClient::new(&server.base_url).unwrap();

    let default = api.test_workflow(None).await.unwrap();
    assert_eq!(default.message, "workflow ok: 안녕하세요");
    assert!(default.thinking_process.is_some());

    let custom = api.test_workflow(Some("ping & pong")).await.unwrap();
    assert_eq!(custom.message, "workflow ok: ping & pong");
}
