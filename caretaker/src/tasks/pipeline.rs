use async_trait::async_trait;
use std::sync::Arc;

use super::{Report, Task, TaskContext};
use crate::errors::{EngineError, EngineResult};
use crate::pipeline::{PipelineService, RunState, StageOutcome, TriggerEvent, TriggerKind};

/// Scheduled pipeline run against a fixed ref with the pipeline's default
/// deployment parameters
pub struct PipelineTask {
    service: Arc<PipelineService>,
    pipeline: String,
    git_ref: String,
}

impl PipelineTask {
    pub fn new(
        service: Arc<PipelineService>,
        pipeline: impl Into<String>,
        git_ref: impl Into<String>,
    ) -> Self {
        Self {
            service,
            pipeline: pipeline.into(),
            git_ref: git_ref.into(),
        }
    }

    async fn run(&self, ctx: &TaskContext) -> EngineResult<Report> {
        ctx.checkpoint()?;

        let event = TriggerEvent::new(TriggerKind::Schedule, self.git_ref.clone());
        let run = self
            .service
            .trigger(&self.pipeline, event, None, &ctx.cancellation)
            .await?;

        let mut report = Report::default();
        for stage in &run.stages {
            let outcome = match stage.outcome {
                StageOutcome::Pass => "pass",
                StageOutcome::Fail if stage.blocking => "FAIL",
                StageOutcome::Fail => "fail (non-blocking)",
                StageOutcome::Skipped => "skipped",
            };
            report.line(format!("{}: {}", stage.name, outcome));
        }
        if run.log_artifact.is_some() {
            report.artifacts_written += 1;
        }

        match run.state {
            RunState::Blocked { stage } => Err(EngineError::PipelineBlocked {
                pipeline: self.pipeline.clone(),
                stage,
                run_id: run.id.to_string(),
            }),
            RunState::Cancelled { .. } => Err(EngineError::Cancelled {
                task_id: ctx.task_id.clone(),
            }),
            _ => Ok(report),
        }
    }
}

#[async_trait]
impl Task for PipelineTask {
    fn kind(&self) -> &'static str {
        "pipeline"
    }

    async fn execute(&self, ctx: &TaskContext) -> EngineResult<Report> {
        self.run(ctx).await
    }
}
