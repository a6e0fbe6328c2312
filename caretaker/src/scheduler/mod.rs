//! Clock/trigger sources
//!
//! The engine never reads cron tables or timers itself. Trigger sources turn
//! "it is time" into a [`FireEvent`] on a channel, and the engine reacts to
//! events only. This keeps task execution replayable in tests: a test fires
//! events directly instead of waiting for a schedule.
//!
//! # Sources
//!
//! - [`CronTrigger`]: 6-field cron expressions (sec min hour day month dow)
//!   evaluated in the configured timezone via `tokio-cron-scheduler`
//! - Manual invocation: the HTTP API and `Engine::fire`
//!
//! # Configuration
//!
//! ```toml
//! [[backups]]
//! id = "nightly-logs"
//! category = "logs"
//! schedule = "0 0 2 * * *"  # Daily at 2 AM
//! ```

pub mod cron;
pub use cron::{validate_6_field_cron, CronTrigger};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a task execution started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Schedule,
    Manual,
}

impl Trigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Trigger::Schedule => "schedule",
            Trigger::Manual => "manual",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// "Run this task now"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FireEvent {
    pub task_id: String,
    pub trigger: Trigger,
}

impl FireEvent {
    pub fn new(task_id: impl Into<String>, trigger: Trigger) -> Self {
        Self {
            task_id: task_id.into(),
            trigger,
        }
    }
}
