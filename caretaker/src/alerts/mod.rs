//! Alert routing
//!
//! An [`Alert`] is handed to the [`AlertDispatcher`], which fans it out to
//! every configured [`AlertSink`] concurrently. Alerting is best-effort: a
//! failing sink is logged and never fails the task that raised the alert.
//!
//! New channels are added by implementing [`AlertSink`]; nothing in the
//! monitor or the dispatcher changes.

pub mod dispatcher;
pub mod escalation;
pub mod sinks;

pub use dispatcher::{AlertDispatcher, DispatchSummary};
pub use escalation::{EscalationDecision, EscalationTracker};
pub use sinks::{LogFileSink, TracingSink, WebhookSink};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::SinkError;
use crate::monitor::Severity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub severity: Severity,
    pub subject: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl Alert {
    pub fn new(
        severity: Severity,
        subject: impl Into<String>,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            severity,
            subject: subject.into(),
            message: message.into(),
            timestamp,
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, alert: &Alert) -> Result<(), SinkError>;
}
