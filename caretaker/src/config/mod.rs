pub mod manager;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub use manager::ConfigManager;

use crate::artifacts::store::validate_segment;
use crate::artifacts::RetentionPolicy;
use crate::constants::artifacts::PIPELINE_RUNS_CATEGORY;
use crate::constants::defaults;
use crate::errors::ConfigError;
use crate::pipeline::{DeployParams, PipelineDefinition, StageDefinition};
use crate::registry::RetryPolicy;
use crate::scheduler::validate_6_field_cron;
use crate::tasks::BackupSource;

fn default_host() -> String {
    defaults::HOST.to_string()
}

fn default_port() -> u16 {
    defaults::PORT
}

fn default_data_dir() -> String {
    defaults::DATA_DIR.to_string()
}

fn default_database_path() -> String {
    defaults::DATABASE_PATH.to_string()
}

fn default_timezone() -> String {
    defaults::TIMEZONE.to_string()
}

fn default_alert_log_path() -> String {
    defaults::ALERT_LOG_PATH.to_string()
}

fn default_true() -> bool {
    true
}

fn default_deploy_branches() -> Vec<String> {
    vec!["main".to_string()]
}

fn default_task_timeout() -> u64 {
    defaults::TASK_TIMEOUT_SECONDS
}

fn default_command_timeout() -> u64 {
    defaults::COMMAND_TIMEOUT_SECONDS
}

fn default_warning_days() -> u32 {
    defaults::WARNING_DAYS
}

fn default_critical_days() -> u32 {
    defaults::CRITICAL_DAYS
}

fn default_ref() -> String {
    "main".to_string()
}

/// `main.toml` plus every task file found next to it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    /// Timezone cron schedules are interpreted in, e.g. "Europe/Berlin"
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_alert_log_path")]
    pub alert_log_path: String,
    pub alarm_webhook_url: Option<String>,
    #[serde(default = "default_true")]
    pub tracing_sink_enabled: bool,
    /// Category name -> max age in days
    #[serde(default)]
    pub retention: HashMap<String, u32>,
    /// Used by pipelines that don't list their own
    #[serde(default = "default_deploy_branches")]
    pub deploy_branches: Vec<String>,
    // Populated from task files
    #[serde(skip)]
    pub backups: Vec<BackupTaskConfig>,
    #[serde(skip)]
    pub certificates: Vec<CertificateTaskConfig>,
    #[serde(skip)]
    pub pipelines: Vec<PipelineConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            database_path: default_database_path(),
            timezone: default_timezone(),
            alert_log_path: default_alert_log_path(),
            alarm_webhook_url: None,
            tracing_sink_enabled: true,
            retention: HashMap::new(),
            deploy_branches: default_deploy_branches(),
            backups: Vec::new(),
            certificates: Vec::new(),
            pipelines: Vec::new(),
        }
    }
}

/// Contents of one task file under the config directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFile {
    #[serde(default)]
    pub backups: Vec<BackupTaskConfig>,
    #[serde(default)]
    pub certificates: Vec<CertificateTaskConfig>,
    #[serde(default)]
    pub pipelines: Vec<PipelineConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupTaskConfig {
    pub id: String,
    /// Artifact category the sources are written to
    pub category: String,
    pub sources: Vec<BackupSource>,
    pub schedule: Option<String>,
    #[serde(default = "default_task_timeout")]
    pub timeout_seconds: u64,
    /// Per-source command timeout
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateTaskConfig {
    pub id: String,
    /// `host`, `host:port` or `file:/path/to/cert.pem`
    pub subjects: Vec<String>,
    #[serde(default = "default_warning_days")]
    pub warning_days: u32,
    #[serde(default = "default_critical_days")]
    pub critical_days: u32,
    /// Renewal command run at Critical or Expired, `{subject}` substituted
    pub remediation_command: Option<String>,
    pub schedule: Option<String>,
    #[serde(default = "default_task_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Also the task id of the scheduled run
    pub name: String,
    pub stages: Vec<StageDefinition>,
    pub deploy_branches: Option<Vec<String>>,
    pub schedule: Option<String>,
    /// Ref used by scheduled runs
    #[serde(default = "default_ref")]
    pub default_ref: String,
    pub environment: String,
    pub playbook: String,
    pub tags: Option<String>,
    #[serde(default = "default_task_timeout")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl PipelineConfig {
    pub fn definition(&self, fallback_branches: &[String]) -> PipelineDefinition {
        PipelineDefinition {
            name: self.name.clone(),
            stages: self.stages.clone(),
            deploy_branches: self
                .deploy_branches
                .clone()
                .unwrap_or_else(|| fallback_branches.to_vec()),
        }
    }

    pub fn default_params(&self) -> DeployParams {
        DeployParams {
            environment: self.environment.clone(),
            playbook: self.playbook.clone(),
            tags: self.tags.clone(),
        }
    }
}

impl Config {
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| ConfigError::InvalidValue {
                field: "timezone".to_string(),
                reason: e.to_string(),
            })
    }

    pub fn retention_for(&self, category: &str) -> Option<RetentionPolicy> {
        self.retention
            .get(category)
            .map(|&days| RetentionPolicy::new(days))
    }

    /// Checks everything that would otherwise fail at registration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timezone()?;

        for category in self.retention.keys() {
            check_segment("retention", category)?;
        }

        let mut ids = HashSet::new();
        let mut claim = |id: &str| {
            if ids.insert(id.to_string()) {
                Ok(())
            } else {
                Err(invalid(id, "task id is defined more than once"))
            }
        };

        for backup in &self.backups {
            claim(&backup.id)?;
            check_schedule(&backup.id, backup.schedule.as_deref())?;
            check_segment(&backup.id, &backup.category)?;
            if backup.category == PIPELINE_RUNS_CATEGORY {
                return Err(invalid(&backup.id, "category is reserved for pipeline logs"));
            }
            if backup.sources.is_empty() {
                return Err(invalid(&backup.id, "backup has no sources"));
            }
            for source in &backup.sources {
                check_segment(&backup.id, &source.label)?;
            }
        }

        for cert in &self.certificates {
            claim(&cert.id)?;
            check_schedule(&cert.id, cert.schedule.as_deref())?;
            if cert.warning_days <= cert.critical_days {
                return Err(invalid(
                    &cert.id,
                    &format!(
                        "warning_days ({}) must be greater than critical_days ({})",
                        cert.warning_days, cert.critical_days
                    ),
                ));
            }
            if cert.subjects.is_empty() {
                return Err(invalid(&cert.id, "no certificate subjects"));
            }
        }

        for pipeline in &self.pipelines {
            claim(&pipeline.name)?;
            check_schedule(&pipeline.name, pipeline.schedule.as_deref())?;
            check_segment(&pipeline.name, &pipeline.name)?;
            if pipeline.stages.is_empty() {
                return Err(invalid(&pipeline.name, "pipeline has no stages"));
            }
            let mut stages = HashSet::new();
            for stage in &pipeline.stages {
                if !stages.insert(stage.name.as_str()) {
                    return Err(invalid(
                        &pipeline.name,
                        &format!("stage '{}' is defined twice", stage.name),
                    ));
                }
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn check_schedule(field: &str, schedule: Option<&str>) -> Result<(), ConfigError> {
    match schedule {
        Some(schedule) => {
            validate_6_field_cron(schedule).map_err(|e| invalid(field, &e.to_string()))
        }
        None => Ok(()),
    }
}

fn check_segment(field: &str, name: &str) -> Result<(), ConfigError> {
    validate_segment(name).map_err(|e| invalid(field, &e.to_string()))
}
