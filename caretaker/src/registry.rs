//! Task registry
//!
//! A flat map from task id to an executable unit plus its policy. There is
//! no dependency ordering between tasks; `list` yields tasks in registration
//! order.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::constants::engine::MAX_BACKOFF_SECONDS;
use crate::errors::{EngineError, EngineResult};
use crate::tasks::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backoff {
    #[default]
    Immediate,
    Fixed {
        seconds: u64,
    },
    Exponential {
        base_seconds: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RetryPolicy {
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Immediate,
        }
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let seconds = match self.backoff {
            Backoff::Immediate => 0,
            Backoff::Fixed { seconds } => seconds,
            Backoff::Exponential { base_seconds } => {
                let factor = 2u64.saturating_pow(retry.saturating_sub(1));
                base_seconds.saturating_mul(factor)
            }
        };
        Duration::from_secs(seconds.min(MAX_BACKOFF_SECONDS))
    }
}

/// Identity and policy of a task; immutable once registered
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub id: String,
    /// 6-field cron expression; `None` for manual-only tasks
    pub schedule: Option<String>,
    /// What the task runs, for display ("backup:logs", "pipeline:deploy")
    pub command_ref: String,
    pub timeout: Duration,
    pub retry_policy: RetryPolicy,
}

pub struct RegisteredTask {
    pub spec: TaskSpec,
    pub task: Arc<dyn Task>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub id: String,
    pub kind: String,
    pub schedule: Option<String>,
    pub command_ref: String,
    pub timeout_seconds: u64,
    pub retry_policy: RetryPolicy,
}

impl From<&RegisteredTask> for TaskSummary {
    fn from(registered: &RegisteredTask) -> Self {
        Self {
            id: registered.spec.id.clone(),
            kind: registered.task.kind().to_string(),
            schedule: registered.spec.schedule.clone(),
            command_ref: registered.spec.command_ref.clone(),
            timeout_seconds: registered.spec.timeout.as_secs(),
            retry_policy: registered.spec.retry_policy,
        }
    }
}

#[derive(Default)]
pub struct TaskRegistry {
    tasks: Vec<Arc<RegisteredTask>>,
    index: HashMap<String, usize>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, spec: TaskSpec, task: Arc<dyn Task>) -> EngineResult<Arc<RegisteredTask>> {
        if self.index.contains_key(&spec.id) {
            return Err(EngineError::DuplicateTask { task_id: spec.id });
        }

        info!("Registered task {} ({})", spec.id, spec.command_ref);
        let registered = Arc::new(RegisteredTask { spec, task });
        self.index
            .insert(registered.spec.id.clone(), self.tasks.len());
        self.tasks.push(registered.clone());
        Ok(registered)
    }

    pub fn resolve(&self, id: &str) -> EngineResult<Arc<RegisteredTask>> {
        self.index
            .get(id)
            .map(|&position| self.tasks[position].clone())
            .ok_or_else(|| EngineError::not_found("Task", id))
    }

    pub fn deregister(&mut self, id: &str) -> EngineResult<Arc<RegisteredTask>> {
        let position = self
            .index
            .remove(id)
            .ok_or_else(|| EngineError::not_found("Task", id))?;
        let removed = self.tasks.remove(position);

        for slot in self.index.values_mut() {
            if *slot > position {
                *slot -= 1;
            }
        }

        info!("Deregistered task {}", id);
        Ok(removed)
    }

    /// Registered tasks in registration order; call again to restart
    pub fn list(&self) -> impl Iterator<Item = &Arc<RegisteredTask>> + '_ {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
