//! In-process fake backend for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;

use chatbot::stream::StreamSignal;
use chatbot::{StreamConfig, StreamingApiClient};
use chatbot_protocol::ChatRequest;

/// Requests seen by the fake backend.
#[derive(Debug, Clone, Default)]
pub struct Recorded {
    pub stream_queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
    pub chat_requests: Arc<Mutex<Vec<ChatRequest>>>,
    pub cleared: Arc<Mutex<Vec<String>>>,
}

impl Recorded {
    pub fn stream_queries(&self) -> Vec<HashMap<String, String>> {
        self.stream_queries.lock().unwrap().clone()
    }

    pub fn chat_requests(&self) -> Vec<ChatRequest> {
        self.chat_requests.lock().unwrap().clone()
    }

    pub fn cleared(&self) -> Vec<String> {
        self.cleared.lock().unwrap().clone()
    }
}

/// A running fake backend. Aborted on drop.
pub struct TestServer {
    pub base_url: String,
    pub recorded: Recorded,
    task: JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl TestServer {
    pub fn streaming_client(&self) -> StreamingApiClient {
        StreamingApiClient::new(StreamConfig {
            base_url: self.base_url.clone(),
            ..StreamConfig::default()
        })
        .unwrap()
    }
}

/// Start the fake backend on an ephemeral port.
pub async fn spawn_backend() -> TestServer {
    let recorded = Recorded::default();
    let app = Router::new()
        .route("/chatbot/chat/stream", get(stream_handler))
        .route("/api/health", get(health_handler))
        .route("/api/chat/health", get(chat_health_handler))
        .route("/api/chat/", post(chat_handler))
        .route("/api/chat/history/{session_id}", get(history_handler))
        .route("/api/chat/session/{session_id}", delete(clear_handler))
        .route("/api/chat/sessions", get(sessions_handler))
        .route("/api/chat/info", get(info_handler))
        .route("/api/chat/workflow/test", post(workflow_handler))
        .with_state(recorded.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base_url: format!("http://{addr}"),
        recorded,
        task,
    }
}

/// Base URL where nothing is listening.
pub async fn unreachable_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// Receive signals until the channel's sender is dropped or `limit` passes.
pub async fn collect_signals(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<StreamSignal>,
    limit: Duration,
) -> Vec<StreamSignal> {
    let mut signals = Vec::new();
    let _ = tokio::time::timeout(limit, async {
        while let Some(signal) = rx.recv().await {
            signals.push(signal);
        }
    })
    .await;
    signals
}

fn chunk(payload: Value) -> Event {
    Event::default().event("chunk").data(payload.to_string())
}

/// The stream's behavior is picked by the message text.
async fn stream_handler(
    State(recorded): State<Recorded>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let message = query.get("message").cloned().unwrap_or_default();
    recorded.stream_queries.lock().unwrap().push(query);

    let events: Vec<Event> = match message.as_str() {
        "fail" => {
            return (StatusCode::INTERNAL_SERVER_ERROR, "stream unavailable").into_response();
        }
        "hello" => vec![
            chunk(json!({"sessionId": "s1", "chunk": "Hi", "agentType": "general"})),
            chunk(json!({"sessionId": "s1", "chunk": " there", "agentType": "general", "isLast": true})),
        ],
        "plain" => vec![
            Event::default().data("raw text"),
            Event::default().event("complete").data("[DONE]"),
        ],
        "malformed" => vec![
            Event::default().data("{not json"),
            chunk(json!({"chunk": "ok", "isLast": true})),
        ],
        "boom" => vec![
            chunk(json!({"chunk": "partial"})),
            Event::default().event("error").data("agent crashed"),
        ],
        "slow" => {
            let first = tokio_stream::iter(vec![Ok::<_, Infallible>(chunk(json!({"chunk": "first"})))]);
            return Sse::new(first.chain(tokio_stream::pending())).into_response();
        }
        // Word-by-word reply without a completion marker, then the
        // connection closes.
        other => other
            .split(' ')
            .map(|word| chunk(json!({"chunk": word, "agentType": "general"})))
            .collect(),
    };

    let stream = tokio_stream::iter(events.into_iter().map(Ok::<_, Infallible>));
    Sse::new(stream).into_response()
}

async fn health_handler() -> Json<Value> {
    Json(json!({"status": "ok", "timestamp": "2026-01-01T00:00:00Z"}))
}

async fn chat_health_handler() -> Json<Value> {
    Json(json!({"status": "UP"}))
}

async fn chat_handler(State(recorded): State<Recorded>, Json(request): Json<ChatRequest>) -> Response {
    recorded.chat_requests.lock().unwrap().push(request.clone());

    if request.message == "explode" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "internal failure").into_response();
    }
    if request.message == "garbage" {
        return "not json".into_response();
    }

    Json(json!({
        "message": format!("echo: {}", request.message),
        "agent_used": "code",
        "metadata": {"processing_time": 0.5, "confidence": 0.9},
        "session_id": request.session_id,
    }))
    .into_response()
}

async fn history_handler(Path(session_id): Path<String>) -> Json<Value> {
    let messages = if session_id == "s1" {
        json!([
            {"role": "user", "content": "hi", "timestamp": "2026-01-01T10:00:00"},
            {"role": "system", "content": "routing"},
            {"role": "assistant", "content": "hello", "agent_type": "general",
             "timestamp": "2026-01-01T10:00:01Z"},
        ])
    } else {
        json!([])
    };
    Json(json!({"messages": messages, "session_id": session_id}))
}

async fn clear_handler(
    State(recorded): State<Recorded>,
    Path(session_id): Path<String>,
) -> Json<Value> {
    recorded.cleared.lock().unwrap().push(session_id.clone());
    Json(json!({"message": "Session cleared", "session_id": session_id}))
}

async fn sessions_handler() -> Json<Value> {
    Json(json!({"active_sessions": ["s1", "s2"]}))
}

async fn info_handler() -> Json<Value> {
    Json(json!({
        "name": "Multi-Agent Chatbot",
        "version": "1.0.0",
        "agents": ["supervisor", "rag", "code", "search", "general"],
    }))
}

async fn workflow_handler(Query(query): Query<HashMap<String, String>>) -> Json<Value> {
    let test_query = query.get("test_query").cloned().unwrap_or_default();
    Json(json!({
        "message": format!("workflow ok: {test_query}"),
        "agent_used": "supervisor",
        "thinking_process": [{"step": "route", "agent": "general"}],
    }))
}
