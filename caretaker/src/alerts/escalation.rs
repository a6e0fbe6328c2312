//! Per-subject alert escalation state
//!
//! A subject stuck at the same severity is re-notified on a progressive
//! schedule (6h, 6h, 12h, then every 24h). A change of severity is always
//! notified immediately, and a subject that was alerted and returns to
//! [`Severity::Ok`] produces exactly one recovery notification.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::constants::alerts;
use crate::monitor::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationDecision {
    Send,
    Suppress,
    Recover,
}

#[derive(Debug, Clone)]
struct SubjectState {
    severity: Severity,
    last_sent: DateTime<Utc>,
    sent_count: u32,
}

#[derive(Default)]
pub struct EscalationTracker {
    states: Mutex<HashMap<String, SubjectState>>,
}

impl EscalationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interval to wait after the `sent_count`-th notification
    pub fn renotify_interval(sent_count: u32) -> Duration {
        let hours = match sent_count {
            0 | 1 => alerts::SECOND_ALERT_INTERVAL_HOURS,
            2 => alerts::THIRD_ALERT_INTERVAL_HOURS,
            3 => alerts::FOURTH_ALERT_INTERVAL_HOURS,
            _ => alerts::SUBSEQUENT_ALERT_INTERVAL_HOURS,
        };
        Duration::hours(hours)
    }

    pub async fn observe(
        &self,
        subject: &str,
        severity: Severity,
        now: DateTime<Utc>,
    ) -> EscalationDecision {
        let mut states = self.states.lock().await;

        if !severity.requires_alert() {
            return match states.remove(subject) {
                Some(_) => EscalationDecision::Recover,
                None => EscalationDecision::Suppress,
            };
        }

        match states.get_mut(subject) {
            None => {
                states.insert(
                    subject.to_string(),
                    SubjectState {
                        severity,
                        last_sent: now,
                        sent_count: 1,
                    },
                );
                EscalationDecision::Send
            }
            Some(state) if state.severity != severity => {
                debug!(
                    "{} moved from {} to {}, notifying",
                    subject, state.severity, severity
                );
                state.severity = severity;
                state.last_sent = now;
                state.sent_count = 1;
                EscalationDecision::Send
            }
            Some(state) => {
                if now - state.last_sent >= Self::renotify_interval(state.sent_count) {
                    state.last_sent = now;
                    state.sent_count += 1;
                    EscalationDecision::Send
                } else {
                    debug!(
                        "Suppressing repeat {} alert for {} (sent {} times)",
                        severity, subject, state.sent_count
                    );
                    EscalationDecision::Suppress
                }
            }
        }
    }

    pub async fn clear(&self, subject: &str) {
        self.states.lock().await.remove(subject);
    }
}
