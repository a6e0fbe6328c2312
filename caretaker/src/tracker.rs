//! In-flight task tracking
//!
//! At most one execution of a task id is in flight at any time. A fire for a
//! task that is still running is refused with [`EngineError::TaskBusy`]
//! instead of queueing a second copy behind it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::clock::Clock;
use crate::errors::{EngineError, EngineResult};
use crate::scheduler::Trigger;
use crate::tasks::CancellationFlag;

#[derive(Debug, Clone, Serialize)]
pub struct ActiveTask {
    pub task_id: String,
    pub run_id: String,
    pub trigger: Trigger,
    pub started_at: DateTime<Utc>,
    #[serde(skip)]
    pub cancellation: CancellationFlag,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackerStatus {
    pub active: Vec<ActiveTask>,
    pub total_active: usize,
}

#[derive(Clone)]
pub struct InFlightTracker {
    active: Arc<RwLock<HashMap<String, ActiveTask>>>,
    clock: Arc<dyn Clock>,
}

impl InFlightTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            active: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Claims the task id; the returned flag is how the run gets cancelled
    #[instrument(skip(self), fields(task = %task_id))]
    pub async fn try_start(
        &self,
        task_id: &str,
        run_id: &str,
        trigger: Trigger,
    ) -> EngineResult<CancellationFlag> {
        let mut active = self.active.write().await;
        let now = self.clock.now();

        if let Some(current) = active.get(task_id) {
            return Err(EngineError::TaskBusy {
                task_id: task_id.to_string(),
                running_for_secs: now.signed_duration_since(current.started_at).num_seconds(),
            });
        }

        let cancellation = CancellationFlag::new();
        active.insert(
            task_id.to_string(),
            ActiveTask {
                task_id: task_id.to_string(),
                run_id: run_id.to_string(),
                trigger,
                started_at: now,
                cancellation: cancellation.clone(),
            },
        );
        info!("Task {} started (run {}, {})", task_id, run_id, trigger);
        Ok(cancellation)
    }

    pub async fn finish(&self, task_id: &str) {
        let mut active = self.active.write().await;
        if let Some(task) = active.remove(task_id) {
            let took = self.clock.now().signed_duration_since(task.started_at);
            info!("Task {} finished (took {}s)", task_id, took.num_seconds());
        }
    }

    /// Requests cooperative cancellation; the task stays tracked until its
    /// run actually ends
    pub async fn cancel(&self, task_id: &str) -> EngineResult<()> {
        let active = self.active.read().await;
        match active.get(task_id) {
            Some(task) => {
                warn!("Cancellation requested for task {} (run {})", task_id, task.run_id);
                task.cancellation.cancel();
                Ok(())
            }
            None => Err(EngineError::not_found("RunningTask", task_id)),
        }
    }

    /// Holds the task id until released; dropping it unreleased (a panic or
    /// an aborted run) frees the id in the background
    pub fn slot(&self, task_id: &str) -> InFlightSlot {
        InFlightSlot {
            tracker: self.clone(),
            task_id: Some(task_id.to_string()),
        }
    }

    pub async fn is_busy(&self, task_id: &str) -> bool {
        self.active.read().await.contains_key(task_id)
    }

    pub async fn status(&self) -> TrackerStatus {
        let active = self.active.read().await;
        let mut tasks: Vec<ActiveTask> = active.values().cloned().collect();
        tasks.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        TrackerStatus {
            total_active: tasks.len(),
            active: tasks,
        }
    }
}

pub struct InFlightSlot {
    tracker: InFlightTracker,
    task_id: Option<String>,
}

impl InFlightSlot {
    pub async fn release(mut self) {
        if let Some(task_id) = self.task_id.take() {
            self.tracker.finish(&task_id).await;
        }
    }
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        let Some(task_id) = self.task_id.take() else {
            return;
        };
        warn!("Run of {} ended abnormally, releasing its slot", task_id);
        let tracker = self.tracker.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { tracker.finish(&task_id).await });
            }
            Err(_) => warn!("No runtime to release {}; it stays marked busy", task_id),
        }
    }
}
