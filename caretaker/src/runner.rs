//! Uniform execution of registered tasks
//!
//! Every attempt runs under the task's timeout. A failed attempt is retried
//! per the task's [`RetryPolicy`](crate::registry::RetryPolicy) as long as the
//! error is retryable and the task has not been cancelled. Each run is
//! recorded in the database, but a database failure never fails the run.
//! A panicking task ends its run as failed and is not retried.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use serde_json::json;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::alerts::{Alert, AlertDispatcher};
use crate::clock::Clock;
use crate::database::{Database, TaskRunRecord};
use crate::errors::{EngineError, EngineResult};
use crate::monitor::Severity;
use crate::registry::RegisteredTask;
use crate::scheduler::Trigger;
use crate::tasks::{CancellationFlag, Report, TaskContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub run_id: String,
    pub task_id: String,
    pub trigger: Trigger,
    pub status: RunStatus,
    /// Executions performed, first attempt included
    pub attempts: u32,
    pub report: Option<Report>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl TaskOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

#[derive(Clone)]
pub struct TaskRunner {
    dispatcher: Arc<AlertDispatcher>,
    database: Option<Arc<Database>>,
    clock: Arc<dyn Clock>,
}

impl TaskRunner {
    pub fn new(
        dispatcher: Arc<AlertDispatcher>,
        database: Option<Arc<Database>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            dispatcher,
            database,
            clock,
        }
    }

    #[instrument(skip(self, registered, cancellation), fields(task = %registered.spec.id))]
    pub async fn run(
        &self,
        registered: &RegisteredTask,
        run_id: &str,
        trigger: Trigger,
        cancellation: CancellationFlag,
    ) -> TaskOutcome {
        let spec = &registered.spec;
        let started_at = self.clock.now();

        let mut ctx = TaskContext::new(spec.id.clone(), trigger, self.clock.clone());
        ctx.cancellation = cancellation;

        let mut outcome = TaskOutcome {
            run_id: run_id.to_string(),
            task_id: spec.id.clone(),
            trigger,
            status: RunStatus::Running,
            attempts: 0,
            report: None,
            error: None,
            started_at,
            completed_at: started_at,
        };
        self.record(registered, &outcome).await;

        let result = AssertUnwindSafe(self.run_attempts(registered, &mut ctx, &mut outcome))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(EngineError::Panicked {
                    task_id: spec.id.clone(),
                    message: panic_message(panic.as_ref()),
                })
            });
        outcome.completed_at = self.clock.now();

        match result {
            Ok(report) => {
                info!(
                    "Task {} succeeded after {} attempt(s): {}",
                    spec.id,
                    outcome.attempts,
                    report.summary()
                );
                outcome.status = RunStatus::Succeeded;
                outcome.report = Some(report);
            }
            Err(EngineError::Cancelled { .. }) => {
                warn!("Task {} cancelled after {} attempt(s)", spec.id, outcome.attempts);
                outcome.status = RunStatus::Cancelled;
                outcome.error = Some("cancelled".to_string());
            }
            Err(e) => {
                error!(
                    "Task {} failed after {} attempt(s): {}",
                    spec.id, outcome.attempts, e
                );
                outcome.status = RunStatus::Failed;
                outcome.error = Some(e.to_string());
                if registered.task.surfaces_failures() {
                    self.alert_failure(registered, &outcome, &e).await;
                }
            }
        }

        self.record(registered, &outcome).await;
        outcome
    }

    async fn run_attempts(
        &self,
        registered: &RegisteredTask,
        ctx: &mut TaskContext,
        outcome: &mut TaskOutcome,
    ) -> EngineResult<Report> {
        let spec = &registered.spec;
        let max_retries = spec.retry_policy.max_retries;
        let mut attempt = 0;

        loop {
            ctx.checkpoint()?;
            ctx.attempt = attempt;
            outcome.attempts = attempt + 1;

            let result = match tokio::time::timeout(spec.timeout, registered.task.execute(ctx)).await
            {
                Ok(result) => result,
                Err(_) => Err(EngineError::Timeout {
                    operation: format!("task {}", spec.id),
                    after: spec.timeout,
                }),
            };

            let error = match result {
                Ok(report) => return Ok(report),
                Err(e) => e,
            };

            if matches!(error, EngineError::Cancelled { .. })
                || !error.is_retryable()
                || attempt >= max_retries
            {
                return Err(error);
            }

            attempt += 1;
            let delay = spec.retry_policy.delay_for(attempt);
            warn!(
                "Task {} attempt {} failed, retry {}/{} in {}s: {}",
                spec.id,
                attempt,
                attempt,
                max_retries,
                delay.as_secs(),
                error
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }

    async fn alert_failure(&self, registered: &RegisteredTask, outcome: &TaskOutcome, e: &EngineError) {
        let alert = Alert::new(
            Severity::Critical,
            registered.spec.id.clone(),
            format!(
                "Task {} failed after {} attempt(s): {}",
                registered.spec.id, outcome.attempts, e
            ),
            self.clock.now(),
        )
        .with_details(json!({
            "run_id": outcome.run_id,
            "kind": registered.task.kind(),
            "trigger": outcome.trigger,
        }));

        let summary = self.dispatcher.dispatch(&alert).await;
        if summary.delivered() == 0 {
            error!("Failure alert for task {} reached no sink", registered.spec.id);
        }
    }

    async fn record(&self, registered: &RegisteredTask, outcome: &TaskOutcome) {
        let Some(database) = &self.database else {
            return;
        };

        let report = outcome
            .report
            .as_ref()
            .and_then(|r| serde_json::to_string(r).ok());

        let record = TaskRunRecord {
            id: outcome.run_id.clone(),
            task_id: outcome.task_id.clone(),
            task_kind: registered.task.kind().to_string(),
            trigger: outcome.trigger.as_str().to_string(),
            status: outcome.status.as_str().to_string(),
            attempts: i64::from(outcome.attempts),
            started_at: outcome.started_at,
            completed_at: (outcome.status != RunStatus::Running).then_some(outcome.completed_at),
            error_message: outcome.error.clone(),
            report,
        };

        if let Err(e) = database.store_task_run(&record).await {
            warn!("Run {} of task {} not recorded: {}", outcome.run_id, outcome.task_id, e);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
