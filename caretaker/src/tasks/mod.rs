//! Executable maintenance tasks
//!
//! A task is a value implementing [`Task`]: it receives an explicit
//! [`TaskContext`] and returns a structured [`Report`] or an
//! [`EngineError`]. Timeouts and retries are applied uniformly by the
//! runner, never by individual tasks.
//!
//! - [`BackupTask`]: captures command output into the artifact store, then
//!   prunes the category by its retention policy
//! - [`CertificateTask`]: evaluates certificate expiry and escalates alerts
//! - [`PipelineTask`]: runs a deployment pipeline on a schedule

pub mod backup;
pub mod certificate;
pub mod pipeline;

pub use backup::{BackupSource, BackupTask};
pub use certificate::CertificateTask;
pub use pipeline::PipelineTask;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::clock::Clock;
use crate::errors::{EngineError, EngineResult};
use crate::scheduler::Trigger;

#[async_trait]
pub trait Task: Send + Sync {
    /// Short name of the task type, e.g. "backup"
    fn kind(&self) -> &'static str;

    async fn execute(&self, ctx: &TaskContext) -> EngineResult<Report>;

    /// Tasks that must raise an alert when they finally fail
    fn surfaces_failures(&self) -> bool {
        false
    }
}

/// Cooperative stop request shared between the engine and a running task
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct TaskContext {
    pub task_id: String,
    pub trigger: Trigger,
    /// 0 for the first execution, incremented per retry
    pub attempt: u32,
    pub clock: Arc<dyn Clock>,
    pub cancellation: CancellationFlag,
    /// Steps finished by earlier attempts of the same run
    completed: Arc<Mutex<HashSet<String>>>,
}

impl TaskContext {
    pub fn new(task_id: impl Into<String>, trigger: Trigger, clock: Arc<dyn Clock>) -> Self {
        Self {
            task_id: task_id.into(),
            trigger,
            attempt: 0,
            clock,
            cancellation: CancellationFlag::new(),
            completed: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Records a step whose output is durable, so a retry can skip it
    pub fn mark_completed(&self, step: impl Into<String>) {
        self.completed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(step.into());
    }

    pub fn is_completed(&self, step: &str) -> bool {
        self.completed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(step)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Called between subtasks; never in the middle of a write
    pub fn checkpoint(&self) -> EngineResult<()> {
        if self.cancellation.is_cancelled() {
            return Err(EngineError::Cancelled {
                task_id: self.task_id.clone(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Report {
    pub lines: Vec<String>,
    pub artifacts_written: usize,
    pub artifacts_pruned: usize,
    pub bytes_written: u64,
    pub alerts_dispatched: usize,
    /// Smallest days-remaining value seen by an expiry check
    pub min_days_remaining: Option<f64>,
}

impl Report {
    pub fn line(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn observe_days_remaining(&mut self, days: f64) {
        self.min_days_remaining = Some(match self.min_days_remaining {
            Some(current) => current.min(days),
            None => days,
        });
    }

    pub fn summary(&self) -> String {
        self.lines.join("; ")
    }
}
