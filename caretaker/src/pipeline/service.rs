use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::{DeployParams, PipelineGate, PipelineRun, RunState, TriggerEvent};
use crate::alerts::{Alert, AlertDispatcher};
use crate::artifacts::{ArtifactStore, RetentionPolicy};
use crate::clock::Clock;
use crate::constants::artifacts::PIPELINE_RUNS_CATEGORY;
use crate::database::{Database, PipelineRunRecord};
use crate::errors::{EngineError, EngineResult};
use crate::monitor::Severity;
use crate::tasks::CancellationFlag;

struct RegisteredPipeline {
    gate: PipelineGate,
    defaults: DeployParams,
    /// Held for the whole run: runs of one pipeline never overlap
    run_lock: Mutex<()>,
}

/// Owns every configured pipeline and records the outcome of each run
pub struct PipelineService {
    pipelines: HashMap<String, RegisteredPipeline>,
    store: Arc<ArtifactStore>,
    dispatcher: Arc<AlertDispatcher>,
    database: Option<Arc<Database>>,
    clock: Arc<dyn Clock>,
    log_retention: Option<RetentionPolicy>,
}

impl PipelineService {
    pub fn new(
        store: Arc<ArtifactStore>,
        dispatcher: Arc<AlertDispatcher>,
        database: Option<Arc<Database>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pipelines: HashMap::new(),
            store,
            dispatcher,
            database,
            clock,
            log_retention: None,
        }
    }

    /// Age limit for persisted stage logs, applied after every run
    pub fn with_log_retention(mut self, policy: Option<RetentionPolicy>) -> Self {
        self.log_retention = policy;
        self
    }

    pub fn add(&mut self, gate: PipelineGate, defaults: DeployParams) -> EngineResult<()> {
        let name = gate.definition().name.clone();
        if self.pipelines.contains_key(&name) {
            return Err(EngineError::policy(format!(
                "pipeline '{}' is defined twice",
                name
            )));
        }
        self.pipelines.insert(
            name,
            RegisteredPipeline {
                gate,
                defaults,
                run_lock: Mutex::new(()),
            },
        );
        Ok(())
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pipelines.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn gate(&self, name: &str) -> EngineResult<&PipelineGate> {
        self.pipelines
            .get(name)
            .map(|p| &p.gate)
            .ok_or_else(|| EngineError::not_found("Pipeline", name))
    }

    /// Runs the pipeline to completion; a blocked run is still `Ok`
    pub async fn trigger(
        &self,
        name: &str,
        event: TriggerEvent,
        params: Option<DeployParams>,
        cancellation: &CancellationFlag,
    ) -> EngineResult<PipelineRun> {
        let pipeline = self
            .pipelines
            .get(name)
            .ok_or_else(|| EngineError::not_found("Pipeline", name))?;

        let params = params.unwrap_or_else(|| pipeline.defaults.clone());

        let _guard = pipeline.run_lock.lock().await;
        let mut run = pipeline.gate.run(event, params, cancellation).await?;

        self.persist_log(&mut run).await;
        self.record(&run).await;

        if let RunState::Blocked { stage } = &run.state {
            self.alert_blocked(&run, stage).await;
        }

        Ok(run)
    }

    /// Looks a run up by id in the run history
    pub async fn get_run(&self, run_id: &str) -> EngineResult<PipelineRun> {
        let database = self
            .database
            .as_ref()
            .ok_or_else(|| EngineError::not_found("PipelineRun", run_id))?;

        let record = database
            .get_pipeline_run(run_id)
            .await?
            .ok_or_else(|| EngineError::not_found("PipelineRun", run_id))?;

        serde_json::from_str(&record.run_json).map_err(|e| {
            EngineError::Storage(crate::errors::StorageError::Serialization {
                reason: e.to_string(),
            })
        })
    }

    async fn persist_log(&self, run: &mut PipelineRun) {
        let payload = match serde_json::to_vec_pretty(&*run) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Could not serialize pipeline run {}: {}", run.id, e);
                return;
            }
        };

        let label = format!("{}.json", run.pipeline);
        match self
            .store
            .write(PIPELINE_RUNS_CATEGORY, &label, &payload)
            .await
        {
            Ok(artifact) => {
                info!("Pipeline run {} logged as {}", run.id, artifact.name);
                run.log_artifact = Some(artifact.name);
            }
            Err(e) => warn!("Could not persist log of pipeline run {}: {}", run.id, e),
        }

        if let Some(policy) = &self.log_retention {
            if let Err(e) = self.store.prune(PIPELINE_RUNS_CATEGORY, policy).await {
                warn!("Pruning pipeline logs failed, continuing: {}", e);
            }
        }
    }

    async fn record(&self, run: &PipelineRun) {
        let Some(database) = &self.database else {
            return;
        };

        let run_json = match serde_json::to_string(run) {
            Ok(json) => json,
            Err(e) => {
                error!("Could not serialize pipeline run {}: {}", run.id, e);
                return;
            }
        };

        let record = PipelineRunRecord {
            id: run.id.to_string(),
            pipeline: run.pipeline.clone(),
            trigger_kind: format!("{:?}", run.trigger.kind).to_lowercase(),
            git_ref: run.trigger.git_ref.clone(),
            state: run.state.as_str().to_string(),
            blocked_stage: match &run.state {
                RunState::Blocked { stage } => Some(stage.clone()),
                _ => None,
            },
            started_at: run.started_at,
            completed_at: run.completed_at,
            run_json,
        };

        if let Err(e) = database.store_pipeline_run(&record).await {
            warn!("Pipeline run {} not recorded: {}", run.id, e);
        }
    }

    async fn alert_blocked(&self, run: &PipelineRun, stage: &str) {
        let output = run
            .stage(stage)
            .map(|s| s.output.clone())
            .unwrap_or_default();

        let alert = Alert::new(
            Severity::Critical,
            format!("pipeline:{}", run.pipeline),
            format!(
                "Pipeline {} blocked at stage {} on {}",
                run.pipeline, stage, run.trigger.git_ref
            ),
            self.clock.now(),
        )
        .with_details(json!({
            "run_id": run.id.to_string(),
            "stage": stage,
            "output": output,
            "log_artifact": run.log_artifact,
        }));

        let summary = self.dispatcher.dispatch(&alert).await;
        info!(
            "Blocked-pipeline alert for {} delivered to {}/{} sinks",
            run.pipeline,
            summary.delivered(),
            summary.attempted
        );
    }
}
