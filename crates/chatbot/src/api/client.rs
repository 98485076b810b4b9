//! HTTP client for the chatbot JSON API.

use std::time::Duration;

use async_trait::async_trait;
use chatbot_protocol::{
    ActiveSessionsResponse, ApiResponse, ChatHistoryResponse, ChatRequest, HealthCheckResponse,
    ServiceInfoResponse, SessionResponse,
};
use log::{debug, error, warn};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use super::error::{ApiError, ApiResult};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Query sent by [`ChatApi::test_workflow`] when none is given.
pub const DEFAULT_WORKFLOW_QUERY: &str = "안녕하세요";

/// Request/response operations of the chatbot backend.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn health_check(&self) -> ApiResult<HealthCheckResponse>;

    async fn send_message(&self, message: &str, session_id: &str) -> ApiResult<ApiResponse>;

    async fn get_chat_history(&self, session_id: &str) -> ApiResult<ChatHistoryResponse>;

    async fn clear_session(&self, session_id: &str) -> ApiResult<SessionResponse>;

    async fn get_active_sessions(&self) -> ApiResult<ActiveSessionsResponse>;

    async fn get_service_info(&self) -> ApiResult<ServiceInfoResponse>;

    async fn chat_health_check(&self) -> ApiResult<HealthCheckResponse>;

    async fn test_workflow(&self, test_query: Option<&str>) -> ApiResult<ApiResponse>;
}

/// Client for the chatbot JSON API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    /// HTTP client.
    client: Client,
    /// Base URL of the backend (e.g., "http://localhost:8080").
    base_url: String,
}

impl ApiClient {
    /// Create a client with the default timeout.
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> ApiResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(ApiError::Client)?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request and decode a JSON body, labelling failures with `operation`.
    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: RequestBuilder,
    ) -> ApiResult<T> {
        let response = request.send().await.map_err(|source| {
            if source.is_connect() {
                error!("Network error: {source}");
            } else {
                error!("Request setup error: {source}");
            }
            ApiError::Request { operation, source }
        })?;

        let status = response.status();
        if !status.is_success() {
            log_status(status);
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                operation,
                status,
                body,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| ApiError::Request { operation, source })?;
        serde_json::from_slice(&body).map_err(|e| ApiError::Parse {
            operation,
            message: e.to_string(),
        })
    }
}

/// Log non-success statuses by class.
fn log_status(status: StatusCode) {
    match status {
        StatusCode::UNAUTHORIZED => warn!("Unauthorized access"),
        StatusCode::FORBIDDEN => warn!("Forbidden access"),
        StatusCode::NOT_FOUND => warn!("Resource not found"),
        s if s.is_server_error() => error!("Server error: {s}"),
        s => error!("Request failed: {s}"),
    }
}

#[async_trait]
impl ChatApi for ApiClient {
    async fn health_check(&self) -> ApiResult<HealthCheckResponse> {
        let request = self.client.get(self.url("/api/health"));
        self.execute("Health check failed", request).await
    }

    async fn send_message(&self, message: &str, session_id: &str) -> ApiResult<ApiResponse> {
        debug!("Sending message for session {session_id}");
        let body = ChatRequest {
            message: message.to_string(),
            session_id: session_id.to_string(),
        };
        let request = self.client.post(self.url("/api/chat/")).json(&body);
        self.execute("Failed to send message", request).await
    }

    async fn get_chat_history(&self, session_id: &str) -> ApiResult<ChatHistoryResponse> {
        let path = format!("/api/chat/history/{}", urlencoding::encode(session_id));
        let request = self.client.get(self.url(&path));
        self.execute("Failed to get chat history", request).await
    }

    async fn clear_session(&self, session_id: &str) -> ApiResult<SessionResponse> {
        let path = format!("/api/chat/session/{}", urlencoding::encode(session_id));
        let request = self.client.delete(self.url(&path));
        self.execute("Failed to clear session", request).await
    }

    async fn get_active_sessions(&self) -> ApiResult<ActiveSessionsResponse> {
        let request = self.client.get(self.url("/api/chat/sessions"));
        self.execute("Failed to get active sessions", request).await
    }

    async fn get_service_info(&self) -> ApiResult<ServiceInfoResponse> {
        let request = self.client.get(self.url("/api/chat/info"));
        self.execute("Failed to get service info", request).await
    }

    async fn chat_health_check(&self) -> ApiResult<HealthCheckResponse> {
        let request = self.client.get(self.url("/api/chat/health"));
        self.execute("Chat health check failed", request).await
    }

    async fn test_workflow(&self, test_query: Option<&str>) -> ApiResult<ApiResponse> {
        let query = test_query.unwrap_or(DEFAULT_WORKFLOW_QUERY);
        let request = self
            .client
            .post(self.url("/api/chat/workflow/test"))
            .query(&[("test_query", query)]);
        self.execute("Failed to test workflow", request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation_trims_trailing_slash() {
        let client = ApiClient::new("http://localhost:8080/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.url("/api/health"), "http://localhost:8080/api/health");
    }
}
