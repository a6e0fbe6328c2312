use async_trait::async_trait;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::{Alert, AlertSink};
use crate::errors::SinkError;
use crate::monitor::Severity;

/// Appends one JSON document per line; the sink every deployment has
pub struct LogFileSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl LogFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn append(&self, alert: &Alert) -> Result<(), SinkError> {
        let mut line = serde_json::to_string(alert)
            .map_err(|e| SinkError::new(self.name(), e.to_string()))?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SinkError::new(self.name(), e.to_string()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| SinkError::new(self.name(), format!("{}: {}", self.path.display(), e)))?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|e| SinkError::new(self.name(), e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| SinkError::new(self.name(), e.to_string()))
    }
}

#[async_trait]
impl AlertSink for LogFileSink {
    fn name(&self) -> &str {
        "log_file"
    }

    async fn send(&self, alert: &Alert) -> Result<(), SinkError> {
        self.append(alert).await
    }
}

/// Emits alerts as tracing events; the syslog-equivalent channel when the
/// subscriber forwards to the system journal
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl AlertSink for TracingSink {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn send(&self, alert: &Alert) -> Result<(), SinkError> {
        match alert.severity {
            Severity::Ok => info!(
                target: "caretaker::alert",
                subject = %alert.subject,
                "[{}] {}", alert.severity, alert.message
            ),
            Severity::Warning => warn!(
                target: "caretaker::alert",
                subject = %alert.subject,
                "[{}] {}", alert.severity, alert.message
            ),
            Severity::Critical | Severity::Expired => error!(
                target: "caretaker::alert",
                subject = %alert.subject,
                "[{}] {}", alert.severity, alert.message
            ),
        }
        Ok(())
    }
}

/// POSTs the alert as JSON to an external notifier
pub struct WebhookSink {
    webhook_url: String,
    client: Client,
}

impl WebhookSink {
    pub fn new(webhook_url: impl Into<String>, timeout: Duration) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SinkError::new("webhook", format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            webhook_url: webhook_url.into(),
            client,
        })
    }

    pub fn webhook_url(&self) -> &str {
        &self.webhook_url
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, alert: &Alert) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(alert)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    "webhook timeout".to_string()
                } else {
                    e.to_string()
                };
                SinkError::new(self.name(), reason)
            })?;

        if response.status().is_success() {
            info!("Alert sent successfully for {}: {}", alert.subject, alert.severity);
            Ok(())
        } else {
            Err(SinkError::new(
                self.name(),
                format!("webhook returned status {}", response.status()),
            ))
        }
    }
}
