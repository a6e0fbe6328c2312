use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use super::{Report, Task, TaskContext};
use crate::alerts::{Alert, AlertDispatcher, EscalationDecision, EscalationTracker};
use crate::errors::{EngineError, EngineResult};
use crate::monitor::{CertificateSource, Evaluation, ExpiryCheck, ExpiryMonitor, Severity};

pub struct CertificateTask {
    subjects: Vec<String>,
    warning_days: u32,
    critical_days: u32,
    source: Arc<dyn CertificateSource>,
    monitor: Arc<ExpiryMonitor>,
    dispatcher: Arc<AlertDispatcher>,
    escalation: Arc<EscalationTracker>,
}

impl CertificateTask {
    pub fn new(
        subjects: Vec<String>,
        warning_days: u32,
        critical_days: u32,
        source: Arc<dyn CertificateSource>,
        monitor: Arc<ExpiryMonitor>,
        dispatcher: Arc<AlertDispatcher>,
        escalation: Arc<EscalationTracker>,
    ) -> EngineResult<Self> {
        crate::monitor::expiry::validate_thresholds(warning_days, critical_days)?;
        Ok(Self {
            subjects,
            warning_days,
            critical_days,
            source,
            monitor,
            dispatcher,
            escalation,
        })
    }

    async fn run(&self, ctx: &TaskContext) -> EngineResult<Report> {
        let mut report = Report::default();
        let mut unreadable = Vec::new();

        for subject in &self.subjects {
            ctx.checkpoint()?;

            let not_after = match self.source.not_after(subject).await {
                Ok(not_after) => not_after,
                Err(e) => {
                    warn!("Could not read certificate for {}: {}", subject, e);
                    report.line(format!("{}: unreadable: {}", subject, e));
                    unreadable.push(subject.clone());

                    let decision = self
                        .escalation
                        .observe(subject, Severity::Critical, ctx.now())
                        .await;
                    if decision == EscalationDecision::Send {
                        let alert = Alert::new(
                            Severity::Critical,
                            subject.clone(),
                            format!("Certificate check failed: {}", e),
                            ctx.now(),
                        );
                        self.notify(&mut report, alert).await;
                    }
                    continue;
                }
            };

            let check = ExpiryCheck {
                subject: subject.clone(),
                not_after,
                warning_days: self.warning_days,
                critical_days: self.critical_days,
            };
            let evaluation = self.monitor.evaluate(&check, ctx.now()).await;

            report.observe_days_remaining(evaluation.days_remaining);
            report.line(format!(
                "{}: {} ({:.1} days remaining)",
                subject, evaluation.severity, evaluation.days_remaining
            ));

            self.escalate(ctx, &mut report, &check, &evaluation).await;
        }

        if !unreadable.is_empty() {
            return Err(EngineError::Other(format!(
                "could not read {} of {} certificates: {}",
                unreadable.len(),
                self.subjects.len(),
                unreadable.join(", ")
            )));
        }

        Ok(report)
    }

    async fn escalate(
        &self,
        ctx: &TaskContext,
        report: &mut Report,
        check: &ExpiryCheck,
        evaluation: &Evaluation,
    ) {
        let decision = self
            .escalation
            .observe(&check.subject, evaluation.severity, ctx.now())
            .await;

        let message = match decision {
            EscalationDecision::Suppress => return,
            EscalationDecision::Recover => {
                format!("Certificate for {} is valid again", check.subject)
            }
            EscalationDecision::Send if evaluation.severity == Severity::Expired => format!(
                "Certificate for {} expired {:.1} days ago",
                check.subject, -evaluation.days_remaining
            ),
            EscalationDecision::Send => format!(
                "Certificate for {} expires in {:.1} days",
                check.subject, evaluation.days_remaining
            ),
        };

        let alert = Alert::new(evaluation.severity, check.subject.clone(), message, ctx.now())
            .with_details(json!({
                "not_after": check.not_after.to_rfc3339(),
                "days_remaining": evaluation.days_remaining,
                "warning_days": check.warning_days,
                "critical_days": check.critical_days,
                "remediation": evaluation.remediation,
            }));

        self.notify(report, alert).await;
    }

    async fn notify(&self, report: &mut Report, alert: Alert) {
        let summary = self.dispatcher.dispatch(&alert).await;
        report.alerts_dispatched += 1;
        info!(
            "{} alert for {} delivered to {}/{} sinks",
            alert.severity,
            alert.subject,
            summary.delivered(),
            summary.attempted
        );
    }
}

#[async_trait]
impl Task for CertificateTask {
    fn kind(&self) -> &'static str {
        "certificate"
    }

    async fn execute(&self, ctx: &TaskContext) -> EngineResult<Report> {
        self.run(ctx).await
    }

    fn surfaces_failures(&self) -> bool {
        true
    }
}
