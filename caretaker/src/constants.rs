//! Central repository for timeouts, intervals, defaults and limits
//!
//! Constants are grouped by concern so configuration defaults and the
//! engine's built-in behavior share one source of truth.

use std::time::Duration;

/// Default configuration values
pub mod defaults {
    pub const HOST: &str = "0.0.0.0";
    pub const PORT: u16 = 8095;

    /// Root directory of the artifact store
    pub const DATA_DIR: &str = "data/artifacts";

    pub const DATABASE_PATH: &str = "data/caretaker.db";

    /// Append-only alert log written by the mandatory log sink
    pub const ALERT_LOG_PATH: &str = "data/alerts.log";

    /// Timezone used to interpret cron schedules
    pub const TIMEZONE: &str = "UTC";

    /// Environment variable that overrides the config directory
    pub const CONFIG_DIR_ENV: &str = "CARETAKER_CONFIG_DIR";
    pub const CONFIG_DIR: &str = "config";

    pub const TASK_TIMEOUT_SECONDS: u64 = 3600;
    pub const COMMAND_TIMEOUT_SECONDS: u64 = 1800;
    pub const STAGE_TIMEOUT_SECONDS: u64 = 1800;

    /// Certificate expiry thresholds in days
    pub const WARNING_DAYS: u32 = 30;
    pub const CRITICAL_DAYS: u32 = 7;

    pub const HTTPS_PORT: u16 = 443;
}

/// Timeouts for calls into external collaborators
pub mod timeouts {
    use super::Duration;

    /// Reading a certificate's end date
    pub const CERT_READ: Duration = Duration::from_secs(30);

    /// Best-effort certificate renewal
    pub const REMEDIATION: Duration = Duration::from_secs(300);

    /// Webhook request timeout
    pub const WEBHOOK: Duration = Duration::from_secs(10);
}

/// Alert re-notification schedule for a subject stuck at the same severity
pub mod alerts {
    /// Hours between first and second alert
    pub const SECOND_ALERT_INTERVAL_HOURS: i64 = 6;

    /// Hours between second and third alert
    pub const THIRD_ALERT_INTERVAL_HOURS: i64 = 6;

    /// Hours between third and fourth alert
    pub const FOURTH_ALERT_INTERVAL_HOURS: i64 = 12;

    /// Hours between subsequent alerts after fourth
    pub const SUBSEQUENT_ALERT_INTERVAL_HOURS: i64 = 24;
}

/// Artifact store layout
pub mod artifacts {
    /// Prefix of every artifact file name; sorts lexicographically by time
    pub const STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

    /// Category holding persisted pipeline stage logs
    pub const PIPELINE_RUNS_CATEGORY: &str = "pipeline-runs";

    /// Files being written carry this prefix until renamed into place
    pub const PARTIAL_PREFIX: &str = ".partial-";
}

/// Engine limits
pub mod engine {
    /// Capacity of the fire-event channel between trigger sources and the engine
    pub const EVENT_CHANNEL_CAPACITY: usize = 64;

    /// Default number of run records returned by history queries
    pub const RUN_HISTORY_LIMIT: i64 = 100;

    /// Upper bound for a single backoff delay between retries
    pub const MAX_BACKOFF_SECONDS: u64 = 3600;
}
