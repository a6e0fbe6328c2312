//! The maintenance engine
//!
//! Trigger sources (the cron trigger, the HTTP API) send [`FireEvent`]s.
//! The engine resolves the task, claims it in the in-flight tracker and
//! runs it on its own tokio task, so different tasks run concurrently while
//! any single task id runs at most once at a time.

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::constants::engine::EVENT_CHANNEL_CAPACITY;
use crate::errors::{EngineError, EngineResult};
use crate::registry::{TaskRegistry, TaskSpec, TaskSummary};
use crate::runner::{TaskOutcome, TaskRunner};
use crate::scheduler::{FireEvent, Trigger};
use crate::tasks::Task;
use crate::tracker::{InFlightTracker, TrackerStatus};

/// A started run: its id is known before it completes
pub struct FiredRun {
    pub run_id: String,
    pub handle: JoinHandle<TaskOutcome>,
}

pub struct Engine {
    registry: RwLock<TaskRegistry>,
    runner: TaskRunner,
    tracker: InFlightTracker,
    events: mpsc::Sender<FireEvent>,
    receiver: Mutex<Option<mpsc::Receiver<FireEvent>>>,
}

impl Engine {
    pub fn new(runner: TaskRunner, clock: Arc<dyn Clock>) -> Self {
        let (events, receiver) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            registry: RwLock::new(TaskRegistry::new()),
            runner,
            tracker: InFlightTracker::new(clock),
            events,
            receiver: Mutex::new(Some(receiver)),
        }
    }

    pub async fn register(&self, spec: TaskSpec, task: Arc<dyn Task>) -> EngineResult<()> {
        self.registry.write().await.register(spec, task)?;
        Ok(())
    }

    /// Removes the task; a run already in flight completes normally
    pub async fn deregister(&self, task_id: &str) -> EngineResult<()> {
        self.registry.write().await.deregister(task_id)?;
        Ok(())
    }

    pub async fn tasks(&self) -> Vec<TaskSummary> {
        self.registry
            .read()
            .await
            .list()
            .map(|t| TaskSummary::from(t.as_ref()))
            .collect()
    }

    pub async fn task(&self, task_id: &str) -> EngineResult<TaskSummary> {
        let registered = self.registry.read().await.resolve(task_id)?;
        Ok(TaskSummary::from(registered.as_ref()))
    }

    /// Starts a run in the background
    pub async fn fire(&self, task_id: &str, trigger: Trigger) -> EngineResult<FiredRun> {
        let registered = self.registry.read().await.resolve(task_id)?;
        let run_id = Uuid::new_v4().to_string();
        let cancellation = self.tracker.try_start(task_id, &run_id, trigger).await?;

        let slot = self.tracker.slot(task_id);
        let runner = self.runner.clone();
        let spawned_run_id = run_id.clone();

        let handle = tokio::spawn(async move {
            let outcome = runner
                .run(&registered, &spawned_run_id, trigger, cancellation)
                .await;
            slot.release().await;
            outcome
        });

        Ok(FiredRun { run_id, handle })
    }

    /// Manual run that waits for the outcome
    pub async fn run_now(&self, task_id: &str) -> EngineResult<TaskOutcome> {
        let fired = self.fire(task_id, Trigger::Manual).await?;
        fired
            .handle
            .await
            .map_err(|e| EngineError::Other(format!("run of {} aborted: {}", task_id, e)))
    }

    pub async fn cancel(&self, task_id: &str) -> EngineResult<()> {
        self.tracker.cancel(task_id).await
    }

    pub async fn active(&self) -> TrackerStatus {
        self.tracker.status().await
    }

    pub fn sender(&self) -> mpsc::Sender<FireEvent> {
        self.events.clone()
    }

    /// Consumes fire events for the lifetime of the engine; only the first
    /// call starts a loop
    pub async fn spawn_event_loop(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let mut receiver = self.receiver.lock().await.take()?;
        let engine = Arc::clone(self);

        Some(tokio::spawn(async move {
            info!("Engine event loop started");
            while let Some(event) = receiver.recv().await {
                debug!("Fire event for {} ({})", event.task_id, event.trigger);
                match engine.fire(&event.task_id, event.trigger).await {
                    Ok(fired) => debug!("Task {} fired as run {}", event.task_id, fired.run_id),
                    Err(EngineError::TaskBusy {
                        task_id,
                        running_for_secs,
                    }) => warn!(
                        "Skipping {} fire of {}: previous run still in flight ({}s)",
                        event.trigger, task_id, running_for_secs
                    ),
                    Err(e) => warn!("Could not fire {}: {}", event.task_id, e),
                }
            }
            info!("Engine event loop stopped");
        }))
    }
}
