use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::severity::Severity;
use crate::errors::{EngineError, EngineResult};
use crate::exec::{render_template, CommandExecutor};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpiryCheck {
    pub subject: String,
    pub not_after: DateTime<Utc>,
    pub warning_days: u32,
    pub critical_days: u32,
}

impl ExpiryCheck {
    pub fn new(
        subject: impl Into<String>,
        not_after: DateTime<Utc>,
        warning_days: u32,
        critical_days: u32,
    ) -> EngineResult<Self> {
        validate_thresholds(warning_days, critical_days)?;
        Ok(Self {
            subject: subject.into(),
            not_after,
            warning_days,
            critical_days,
        })
    }

    /// Fractional days until `not_after`; negative once expired
    pub fn days_remaining(&self, now: DateTime<Utc>) -> f64 {
        (self.not_after - now).num_milliseconds() as f64 / MILLIS_PER_DAY
    }
}

pub fn validate_thresholds(warning_days: u32, critical_days: u32) -> EngineResult<()> {
    if warning_days <= critical_days {
        return Err(EngineError::policy(format!(
            "warning_days ({}) must be greater than critical_days ({})",
            warning_days, critical_days
        )));
    }
    Ok(())
}

/// Maps days remaining onto four left-inclusive bands:
/// `(-inf, 0)` Expired, `[0, critical)` Critical, `[critical, warning)`
/// Warning, `[warning, +inf)` Ok.
pub fn classify(days_remaining: f64, warning_days: u32, critical_days: u32) -> Severity {
    if days_remaining < 0.0 {
        Severity::Expired
    } else if days_remaining < f64::from(critical_days) {
        Severity::Critical
    } else if days_remaining < f64::from(warning_days) {
        Severity::Warning
    } else {
        Severity::Ok
    }
}

pub fn evaluate(check: &ExpiryCheck, now: DateTime<Utc>) -> Severity {
    classify(
        check.days_remaining(now),
        check.warning_days,
        check.critical_days,
    )
}

/// Best-effort fix for a subject at Critical or Expired
#[async_trait]
pub trait Remediator: Send + Sync {
    async fn remediate(&self, subject: &str) -> EngineResult<String>;
}

/// Runs a renewal command; `{subject}` is replaced with the checked subject
pub struct CommandRemediator {
    executor: Arc<dyn CommandExecutor>,
    command_template: String,
    timeout: Duration,
}

impl CommandRemediator {
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        command_template: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            executor,
            command_template: command_template.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Remediator for CommandRemediator {
    async fn remediate(&self, subject: &str) -> EngineResult<String> {
        let command = render_template(&self.command_template, &[("subject", subject)]);
        let output = self.executor.run(&command, self.timeout).await?;
        Ok(output.stdout_lossy().trim().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum RemediationOutcome {
    Succeeded(String),
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub subject: String,
    pub severity: Severity,
    pub days_remaining: f64,
    pub remediation: Option<RemediationOutcome>,
}

pub struct ExpiryMonitor {
    remediator: Option<Arc<dyn Remediator>>,
}

impl ExpiryMonitor {
    pub fn new(remediator: Option<Arc<dyn Remediator>>) -> Self {
        Self { remediator }
    }

    pub fn without_remediation() -> Self {
        Self { remediator: None }
    }

    /// Classifies the check and, at Critical or Expired, attempts remediation.
    /// The returned severity is never changed by the remediation result.
    pub async fn evaluate(&self, check: &ExpiryCheck, now: DateTime<Utc>) -> Evaluation {
        let days_remaining = check.days_remaining(now);
        let severity = classify(days_remaining, check.warning_days, check.critical_days);

        info!(
            "{} expires in {:.1} days: {}",
            check.subject, days_remaining, severity
        );

        let remediation = match (&self.remediator, severity.requires_remediation()) {
            (Some(remediator), true) => {
                info!("Attempting remediation for {} ({})", check.subject, severity);
                Some(match remediator.remediate(&check.subject).await {
                    Ok(detail) => {
                        info!("Remediation for {} completed", check.subject);
                        RemediationOutcome::Succeeded(detail)
                    }
                    Err(e) => {
                        warn!("Remediation for {} failed: {}", check.subject, e);
                        RemediationOutcome::Failed(e.to_string())
                    }
                })
            }
            _ => None,
        };

        Evaluation {
            subject: check.subject.clone(),
            severity,
            days_remaining,
            remediation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_must_be_strictly_ordered() {
        assert!(validate_thresholds(30, 7).is_ok());
        assert!(validate_thresholds(7, 7).is_err());
        assert!(validate_thresholds(7, 30).is_err());
        assert!(validate_thresholds(1, 0).is_ok());
    }

    #[test]
    fn boundaries_fall_into_the_band_that_starts_there() {
        assert_eq!(classify(-0.001, 30, 7), Severity::Expired);
        assert_eq!(classify(0.0, 30, 7), Severity::Critical);
        assert_eq!(classify(6.999, 30, 7), Severity::Critical);
        assert_eq!(classify(7.0, 30, 7), Severity::Warning);
        assert_eq!(classify(29.999, 30, 7), Severity::Warning);
        assert_eq!(classify(30.0, 30, 7), Severity::Ok);
    }

    #[test]
    fn zero_critical_days_has_no_critical_band() {
        assert_eq!(classify(0.0, 5, 0), Severity::Warning);
        assert_eq!(classify(-1.0, 5, 0), Severity::Expired);
    }
}
