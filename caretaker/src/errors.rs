//! Error types for the maintenance engine
//!
//! Library code returns [`EngineError`]; wiring code (binary, bootstrap) uses
//! `anyhow` and converts at the edges.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub type EngineResult<T> = Result<T, EngineError>;

/// Main error type for the engine
#[derive(Debug)]
pub enum EngineError {
    /// A task with this id is already registered
    DuplicateTask { task_id: String },

    /// Lookup of a task, pipeline, artifact or run failed
    NotFound { kind: &'static str, id: String },

    /// The task is already executing
    TaskBusy { task_id: String, running_for_secs: i64 },

    /// Artifact persistence errors
    Storage(StorageError),

    /// Execution exceeded its time budget
    Timeout { operation: String, after: Duration },

    /// Alert delivery errors
    Sink(SinkError),

    /// Invalid policy, e.g. threshold ordering
    PolicyViolation { reason: String },

    /// A shell command exited unsuccessfully or could not be spawned
    Command { command: String, reason: String },

    /// Cooperative cancellation was observed
    Cancelled { task_id: String },

    /// Some subtasks failed after others had already produced output
    PartialFailure { failed: Vec<String>, reason: String },

    /// A blocking pipeline stage failed; final for that run
    PipelineBlocked {
        pipeline: String,
        stage: String,
        run_id: String,
    },

    /// The task panicked instead of returning
    Panicked { task_id: String, message: String },

    /// Configuration errors
    Config(ConfigError),

    /// Other errors with context
    Other(String),
}

/// Artifact store error variants
#[derive(Debug)]
pub enum StorageError {
    /// Filesystem operation failed
    Io { path: PathBuf, reason: String },

    /// Category or label is not a safe path segment
    InvalidName { name: String },

    /// Payload could not be encoded
    Serialization { reason: String },
}

/// Failure reported by a single alert sink
#[derive(Debug, Clone)]
pub struct SinkError {
    pub sink: String,
    pub reason: String,
}

/// Configuration error variants
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to load configuration file
    LoadFailed { path: String, reason: String },

    /// Invalid configuration value
    InvalidValue { field: String, reason: String },

    /// Configuration parsing error
    ParseError { reason: String },
}

impl EngineError {
    /// Whether a retry policy should attempt the execution again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Timeout { .. }
                | EngineError::Storage(_)
                | EngineError::Command { .. }
                | EngineError::Sink(_)
                | EngineError::Other(_)
        )
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn policy(reason: impl Into<String>) -> Self {
        EngineError::PolicyViolation {
            reason: reason.into(),
        }
    }
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, err: impl fmt::Display) -> Self {
        StorageError::Io {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

impl SinkError {
    pub fn new(sink: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::DuplicateTask { task_id } => {
                write!(f, "Task '{}' is already registered", task_id)
            }
            EngineError::NotFound { kind, id } => write!(f, "{} '{}' not found", kind, id),
            EngineError::TaskBusy {
                task_id,
                running_for_secs,
            } => write!(
                f,
                "Task '{}' is already running (started {}s ago)",
                task_id, running_for_secs
            ),
            EngineError::Storage(e) => write!(f, "Storage error: {}", e),
            EngineError::Timeout { operation, after } => {
                write!(f, "'{}' timed out after {:?}", operation, after)
            }
            EngineError::Sink(e) => write!(f, "Sink error: {}", e),
            EngineError::PolicyViolation { reason } => write!(f, "Policy violation: {}", reason),
            EngineError::Command { command, reason } => {
                write!(f, "Command '{}' failed: {}", command, reason)
            }
            EngineError::Cancelled { task_id } => write!(f, "Task '{}' was cancelled", task_id),
            EngineError::PartialFailure { reason, .. } => write!(f, "{}", reason),
            EngineError::PipelineBlocked {
                pipeline,
                stage,
                run_id,
            } => write!(
                f,
                "Pipeline '{}' blocked at stage '{}' (run {})",
                pipeline, stage, run_id
            ),
            EngineError::Panicked { task_id, message } => {
                write!(f, "Task '{}' panicked: {}", task_id, message)
            }
            EngineError::Config(e) => write!(f, "Configuration error: {}", e),
            EngineError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io { path, reason } => {
                write!(f, "I/O failure on '{}': {}", path.display(), reason)
            }
            StorageError::InvalidName { name } => {
                write!(f, "'{}' is not a valid artifact path segment", name)
            }
            StorageError::Serialization { reason } => {
                write!(f, "Serialization error: {}", reason)
            }
        }
    }
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sink '{}' failed: {}", self.sink, self.reason)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::LoadFailed { path, reason } => {
                write!(f, "Failed to load config from '{}': {}", path, reason)
            }
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "Invalid value for '{}': {}", field, reason)
            }
            ConfigError::ParseError { reason } => {
                write!(f, "Failed to parse config: {}", reason)
            }
        }
    }
}

impl std::error::Error for EngineError {}
impl std::error::Error for StorageError {}
impl std::error::Error for SinkError {}
impl std::error::Error for ConfigError {}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Other(err.to_string())
    }
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        EngineError::Storage(err)
    }
}

impl From<SinkError> for EngineError {
    fn from(err: SinkError) -> Self {
        EngineError::Sink(err)
    }
}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        EngineError::Config(err)
    }
}
