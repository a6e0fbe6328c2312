//! Mock webhook server for testing alert delivery
//!
//! This simulates a webhook endpoint that receives alerts,
//! allowing tests to verify alerts are sent correctly.

use serde_json::Value;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

/// Mock webhook server that records alert requests
pub struct MockWebhookServer {
    pub server: MockServer,
    pub base_url: String,
}

impl MockWebhookServer {
    /// Create a new mock webhook server
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let base_url = server.uri();
        Self { server, base_url }
    }

    /// Mock successful webhook delivery
    pub async fn mock_success(&self) {
        Mock::given(method("POST"))
            .and(path("/webhook"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&self.server)
            .await;
    }

    /// Mock webhook failure
    pub async fn mock_failure(&self, status_code: u16) {
        Mock::given(method("POST"))
            .and(path("/webhook"))
            .respond_with(ResponseTemplate::new(status_code))
            .mount(&self.server)
            .await;
    }

    /// JSON bodies of every request received so far
    pub async fn received_alerts(&self) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|req| req.body_json::<Value>().ok())
            .collect()
    }

    /// Get the number of webhook requests received
    pub async fn request_count(&self) -> usize {
        self.received_alerts().await.len()
    }

    /// Get the webhook URL
    pub fn webhook_url(&self) -> String {
        format!("{}/webhook", self.base_url)
    }

    /// Verify specific alert was sent
    pub async fn assert_alert_sent(&self, subject: &str, message_contains: &str) -> bool {
        self.received_alerts().await.iter().any(|body| {
            let subject_matches = body
                .get("subject")
                .and_then(|v| v.as_str())
                .map(|v| v == subject)
                .unwrap_or(false);

            let message_matches = body
                .get("message")
                .and_then(|v| v.as_str())
                .map(|v| v.contains(message_contains))
                .unwrap_or(false);

            subject_matches && message_matches
        })
    }
}
