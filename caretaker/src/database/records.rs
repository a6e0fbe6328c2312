//! Database record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One execution of a registered task, including all of its retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRunRecord {
    pub id: String,
    pub task_id: String,
    pub task_kind: String,
    /// "schedule" or "manual"
    pub trigger: String,
    /// "running", "succeeded", "failed" or "cancelled"
    pub status: String,
    pub attempts: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    /// Report serialized as JSON
    pub report: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRunRecord {
    pub id: String,
    pub pipeline: String,
    pub trigger_kind: String,
    pub git_ref: String,
    pub state: String,
    pub blocked_stage: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Full run, stage results included, serialized as JSON
    pub run_json: String,
}
