//! Backend HTTP client
//!
//! Posts chat requests to the backend and aggregates the streamed reply.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::stream::aggregate_with_idle_timeout;

use super::types::{ChatBackend, ChatRequest};

/// Streaming HTTP chat backend
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    chat_url: String,
    health_url: String,
    idle_timeout: Duration,
}

impl HttpBackend {
    /// Create a new backend client
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            client,
            chat_url: config.chat_url(),
            health_url: config.health_url(),
            idle_timeout: config.stream_idle_timeout(),
        })
    }

    /// Get the chat endpoint URL
    pub fn chat_url(&self) -> &str {
        &self.chat_url
    }

    /// Check if the backend is reachable
    ///
    /// Any HTTP response counts, whatever its status: the probe only asks
    /// whether something is listening.
    pub async fn health_check(&self) -> bool {
        match self.client.get(&self.health_url).send().await {
            Ok(response) => {
                debug!("Backend health check: {}", response.status());
                true
            }
            Err(e) => {
                debug!("Backend health check failed: {}", e);
                false
            }
        }
    }

    /// Probe the backend until it answers, at most `attempts` times
    pub async fn wait_until_ready(&self, attempts: u32, interval: Duration) -> bool {
        for attempt in 1..=attempts {
            if self.health_check().await {
                info!("Backend ready at {} (attempt {})", self.health_url, attempt);
                return true;
            }
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }

        warn!(
            "Backend at {} not reachable after {} attempt(s)",
            self.health_url, attempts
        );
        false
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn chat(&self, request: &ChatRequest) -> Result<String> {
        debug!(
            "Sending chat request to backend: {} (session {})",
            self.chat_url, request.session_id
        );

        let response = self
            .client
            .post(&self.chat_url)
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(Error::Http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Backend error: {} - {}", status, body);
            return Err(Error::Backend {
                status: status.as_u16(),
                body,
            });
        }

        let chunks = response.bytes_stream().map(|chunk| chunk.map_err(Error::Http));
        let reply = aggregate_with_idle_timeout(chunks, self.idle_timeout).await?;

        info!(
            "Backend reply for session {}: {} chars",
            request.session_id,
            reply.chars().count()
        );

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionId;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend_for(server: &MockServer) -> HttpBackend {
        let config = BackendConfig {
            base_url: server.uri(),
            ..Default::default()
        };
        HttpBackend::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_chat_aggregates_stream() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"type\":\"status\",\"content\":\"thinking\"}\n\n",
            "data: {\"type\":\"reply\",\"content\":\"Hello, \"}\n\n",
            "data: {\"type\":\"reply\",\"content\":\"world\"}\n\n",
        );

        Mock::given(method("POST"))
            .and(path("/chat"))
            .and(header("accept", "text/event-stream"))
            .and(body_json(serde_json::json!({
                "message": "hi",
                "session_id": "s-1"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let reply = backend
            .chat(&ChatRequest::new("hi", SessionId::from("s-1")))
            .await
            .unwrap();

        assert_eq!(reply, "Hello, world");
    }

    #[tokio::test]
    async fn test_chat_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let backend = backend_for(&server);
        let result = backend
            .chat(&ChatRequest::new("hi", SessionId::from("s-1")))
            .await;

        match result {
            Err(Error::Backend { status, body }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_chat_connection_refused() {
        let config = BackendConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            ..Default::default()
        };
        let backend = HttpBackend::new(&config).unwrap();

        let result = backend
            .chat(&ChatRequest::new("hi", SessionId::from("s-1")))
            .await;

        assert!(matches!(result, Err(Error::Http(_))));
    }

    #[tokio::test]
    async fn test_health_check_any_status() {
        let server = MockServer::start().await;
        // No mocks mounted: wiremock answers 404, which still proves liveness.
        let backend = backend_for(&server);

        assert!(backend.health_check().await);
        assert!(backend.wait_until_ready(1, Duration::from_millis(1)).await);
    }

    #[tokio::test]
    async fn test_wait_until_ready_gives_up() {
        let config = BackendConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            ..Default::default()
        };
        let backend = HttpBackend::new(&config).unwrap();

        assert!(!backend.wait_until_ready(2, Duration::from_millis(10)).await);
    }
}
