use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::{
    DeployParams, PipelineDefinition, PipelineRun, RunState, StageDefinition, StageOutcome,
    StageResult, TriggerEvent, TriggerKind,
};
use crate::clock::Clock;
use crate::errors::{EngineError, EngineResult};
use crate::exec::{render_template, CommandExecutor};
use crate::tasks::CancellationFlag;

/// Values substituted into stage command templates as `{ref}`,
/// `{environment}`, `{playbook}`, `{tags}`, `{run_id}` and `{pipeline}`
#[derive(Debug, Clone)]
pub struct StageVars {
    pub pipeline: String,
    pub run_id: String,
    pub git_ref: String,
    pub environment: String,
    pub playbook: String,
    pub tags: String,
}

impl StageVars {
    pub fn render(&self, template: &str) -> String {
        render_template(
            template,
            &[
                ("pipeline", &self.pipeline),
                ("run_id", &self.run_id),
                ("ref", &self.git_ref),
                ("environment", &self.environment),
                ("playbook", &self.playbook),
                ("tags", &self.tags),
            ],
        )
    }
}

#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Runs one stage; `Ok` carries its output, `Err` means the stage failed
    async fn execute(
        &self,
        stage: &StageDefinition,
        vars: &StageVars,
    ) -> EngineResult<String>;
}

pub struct CommandStageExecutor {
    executor: Arc<dyn CommandExecutor>,
}

impl CommandStageExecutor {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl StageExecutor for CommandStageExecutor {
    async fn execute(
        &self,
        stage: &StageDefinition,
        vars: &StageVars,
    ) -> EngineResult<String> {
        let command = vars.render(&stage.command);
        let output = self
            .executor
            .run(&command, Duration::from_secs(stage.timeout_seconds))
            .await?;
        Ok(output.stdout_lossy())
    }
}

pub struct PipelineGate {
    definition: PipelineDefinition,
    executor: Arc<dyn StageExecutor>,
    clock: Arc<dyn Clock>,
}

impl PipelineGate {
    pub fn new(
        definition: PipelineDefinition,
        executor: Arc<dyn StageExecutor>,
        clock: Arc<dyn Clock>,
    ) -> EngineResult<Self> {
        if definition.stages.is_empty() {
            return Err(EngineError::policy(format!(
                "pipeline '{}' has no stages",
                definition.name
            )));
        }

        let mut seen = HashSet::new();
        for stage in &definition.stages {
            if !seen.insert(stage.name.as_str()) {
                return Err(EngineError::policy(format!(
                    "pipeline '{}' defines stage '{}' twice",
                    definition.name, stage.name
                )));
            }
        }

        Ok(Self {
            definition,
            executor,
            clock,
        })
    }

    pub fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    /// Manual runs may always deploy; push and schedule runs only from a
    /// deploy branch
    pub fn deploy_allowed(&self, event: &TriggerEvent) -> bool {
        match event.kind {
            TriggerKind::Manual => true,
            TriggerKind::Push | TriggerKind::Schedule => self
                .definition
                .deploy_branches
                .iter()
                .any(|pattern| ref_matches(pattern, &event.git_ref)),
        }
    }

    #[instrument(skip(self, params, cancellation), fields(pipeline = %self.definition.name))]
    pub async fn run(
        &self,
        event: TriggerEvent,
        params: DeployParams,
        cancellation: &CancellationFlag,
    ) -> EngineResult<PipelineRun> {
        let selected = self.selected_stages(&event)?;
        let deploy_allowed = self.deploy_allowed(&event);

        let mut run = PipelineRun {
            id: Uuid::new_v4(),
            pipeline: self.definition.name.clone(),
            trigger: event,
            params,
            deploy_allowed,
            stages: Vec::with_capacity(self.definition.stages.len()),
            state: RunState::Pending,
            started_at: self.clock.now(),
            completed_at: None,
            log_artifact: None,
        };

        let vars = StageVars {
            pipeline: self.definition.name.clone(),
            run_id: run.id.to_string(),
            git_ref: run.trigger.git_ref.clone(),
            environment: run.params.environment.clone(),
            playbook: run.params.playbook.clone(),
            tags: run
                .trigger
                .tag_filter
                .clone()
                .or_else(|| run.params.tags.clone())
                .unwrap_or_default(),
        };

        info!(
            "Pipeline {} run {} started ({:?} on {}, deploy allowed: {})",
            run.pipeline, run.id, run.trigger.kind, run.trigger.git_ref, deploy_allowed
        );

        for (index, stage) in self.definition.stages.iter().enumerate() {
            if let Some(selected) = &selected {
                if !selected.contains(stage.name.as_str()) {
                    run.stages.push(skipped(stage, "not selected for this run"));
                    continue;
                }
            }

            if stage.gated && !deploy_allowed {
                info!("Skipping gated stage {}: trigger precondition not met", stage.name);
                run.stages.push(skipped(
                    stage,
                    &format!(
                        "trigger precondition not met for {:?} on {}",
                        run.trigger.kind, run.trigger.git_ref
                    ),
                ));
                continue;
            }

            if cancellation.is_cancelled() {
                warn!("Pipeline {} cancelled before stage {}", run.pipeline, stage.name);
                run.state = RunState::Cancelled {
                    before_stage: stage.name.clone(),
                };
                break;
            }

            run.state = RunState::Running { stage: index };
            info!("Stage {} ({}/{}) running", stage.name, index + 1, self.definition.stages.len());

            let started = Instant::now();
            let result = self.executor.execute(stage, &vars).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            let (outcome, output) = match result {
                Ok(output) => (StageOutcome::Pass, output),
                Err(e) => (StageOutcome::Fail, e.to_string()),
            };

            run.stages.push(StageResult {
                name: stage.name.clone(),
                outcome,
                blocking: stage.blocking,
                output,
                duration_ms,
            });

            match (outcome, stage.blocking) {
                (StageOutcome::Fail, true) => {
                    error!("Blocking stage {} failed, pipeline blocked", stage.name);
                    run.state = RunState::Blocked {
                        stage: stage.name.clone(),
                    };
                    break;
                }
                (StageOutcome::Fail, false) => {
                    warn!("Non-blocking stage {} failed, continuing", stage.name);
                }
                _ => info!("Stage {} passed in {}ms", stage.name, duration_ms),
            }
        }

        if matches!(run.state, RunState::Pending | RunState::Running { .. }) {
            run.state = RunState::Succeeded;
        }
        run.completed_at = Some(self.clock.now());

        info!(
            "Pipeline {} run {} finished: {} ({} of {} stages executed)",
            run.pipeline,
            run.id,
            run.state.as_str(),
            run.stages_executed(),
            self.definition.stages.len()
        );
        Ok(run)
    }

    fn selected_stages(&self, event: &TriggerEvent) -> EngineResult<Option<HashSet<&str>>> {
        let Some(names) = event.selected_stages.as_ref().filter(|n| !n.is_empty()) else {
            return Ok(None);
        };

        let mut selected = HashSet::new();
        for name in names {
            let stage = self
                .definition
                .stages
                .iter()
                .find(|s| &s.name == name)
                .ok_or_else(|| EngineError::not_found("Stage", name.clone()))?;
            selected.insert(stage.name.as_str());
        }
        Ok(Some(selected))
    }
}

fn skipped(stage: &StageDefinition, reason: &str) -> StageResult {
    StageResult {
        name: stage.name.clone(),
        outcome: StageOutcome::Skipped,
        blocking: stage.blocking,
        output: reason.to_string(),
        duration_ms: 0,
    }
}

/// `main` matches `main` and `refs/heads/main`; `release/*` matches any
/// branch starting with `release/`
pub fn ref_matches(pattern: &str, git_ref: &str) -> bool {
    let branch = git_ref.strip_prefix("refs/heads/").unwrap_or(git_ref);
    match pattern.strip_suffix('*') {
        Some(prefix) => branch.starts_with(prefix),
        None => branch == pattern,
    }
}
