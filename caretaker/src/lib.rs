pub mod alerts;
pub mod app;
pub mod artifacts;
pub mod clock;
pub mod config;
pub mod constants;
pub mod database;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod monitor;
pub mod pipeline;
pub mod registry;
pub mod runner;
pub mod scheduler;
pub mod tasks;
pub mod tracker;
pub mod web;

// Re-export commonly used types
pub use app::App;
pub use artifacts::{Artifact, ArtifactStore, RetentionPolicy};
pub use config::{Config, ConfigManager};
pub use database::Database;
pub use engine::Engine;
pub use errors::{EngineError, EngineResult};
pub use monitor::Severity;
pub use pipeline::{PipelineRun, PipelineService};
pub use registry::{RetryPolicy, TaskRegistry, TaskSpec};
pub use runner::{RunStatus, TaskOutcome, TaskRunner};
pub use tasks::{Report, Task, TaskContext};
