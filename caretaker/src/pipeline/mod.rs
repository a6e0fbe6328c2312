//! Deployment pipeline gating
//!
//! A pipeline is an ordered list of stages (typically lint, syntax-check,
//! deploy, notify). Stages never overlap. A failing *blocking* stage moves
//! the run to `Blocked` and nothing after it executes; a failing
//! non-blocking stage is recorded and the run continues.
//!
//! Stages marked `gated` (the deploy stage) only run when the trigger
//! precondition holds: a manual invocation, or a push/schedule on one of the
//! pipeline's deploy branches. The precondition is evaluated once when the
//! run starts.

pub mod gate;
pub mod service;

pub use gate::{CommandStageExecutor, PipelineGate, StageExecutor, StageVars};
pub use service::PipelineService;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::defaults::STAGE_TIMEOUT_SECONDS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Push,
    Manual,
    Schedule,
}

/// External event that starts a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub kind: TriggerKind,
    /// Branch or ref the event refers to, e.g. `refs/heads/main`
    pub git_ref: String,
    /// Run only these stages; `None` or empty runs all
    #[serde(default)]
    pub selected_stages: Option<Vec<String>>,
    /// Overrides the deployment's tags
    #[serde(default)]
    pub tag_filter: Option<String>,
}

impl TriggerEvent {
    pub fn new(kind: TriggerKind, git_ref: impl Into<String>) -> Self {
        Self {
            kind,
            git_ref: git_ref.into(),
            selected_stages: None,
            tag_filter: None,
        }
    }
}

/// Externally supplied deployment parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployParams {
    pub environment: String,
    pub playbook: String,
    #[serde(default)]
    pub tags: Option<String>,
}

fn default_blocking() -> bool {
    true
}

fn default_stage_timeout() -> u64 {
    STAGE_TIMEOUT_SECONDS
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDefinition {
    pub name: String,
    /// Command template; see [`StageVars`] for placeholders
    pub command: String,
    #[serde(default = "default_blocking")]
    pub blocking: bool,
    /// Only entered when the trigger precondition holds
    #[serde(default)]
    pub gated: bool,
    #[serde(default = "default_stage_timeout")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    pub stages: Vec<StageDefinition>,
    /// Branch names (or `prefix*` patterns) that may deploy on push/schedule
    #[serde(default)]
    pub deploy_branches: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageOutcome {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub name: String,
    pub outcome: StageOutcome,
    pub blocking: bool,
    /// Command output, failure reason, or why the stage was skipped
    pub output: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running { stage: usize },
    Succeeded,
    Blocked { stage: String },
    Cancelled { before_stage: String },
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Pending => "pending",
            RunState::Running { .. } => "running",
            RunState::Succeeded => "succeeded",
            RunState::Blocked { .. } => "blocked",
            RunState::Cancelled { .. } => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub pipeline: String,
    pub trigger: TriggerEvent,
    pub params: DeployParams,
    /// Trigger precondition as evaluated at run start
    pub deploy_allowed: bool,
    /// One entry per stage reached, in order
    pub stages: Vec<StageResult>,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Name of the persisted stage log in the `pipeline-runs` category
    #[serde(default)]
    pub log_artifact: Option<String>,
}

impl PipelineRun {
    /// Stages that actually ran (passed or failed)
    pub fn stages_executed(&self) -> usize {
        self.stages
            .iter()
            .filter(|s| s.outcome != StageOutcome::Skipped)
            .count()
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self.state, RunState::Blocked { .. })
    }

    pub fn is_succeeded(&self) -> bool {
        self.state == RunState::Succeeded
    }

    pub fn stage(&self, name: &str) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn failed_stages(&self) -> impl Iterator<Item = &StageResult> {
        self.stages
            .iter()
            .filter(|s| s.outcome == StageOutcome::Fail)
    }
}
