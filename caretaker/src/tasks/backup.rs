use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{Report, Task, TaskContext};
use crate::artifacts::{ArtifactStore, RetentionPolicy};
use crate::errors::{EngineError, EngineResult};
use crate::exec::CommandExecutor;

/// One thing to back up: the command's stdout becomes the artifact payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSource {
    /// Artifact label, e.g. "nginx-logs.tar.gz"
    pub label: String,
    /// e.g. `tar -czf - -C /var/log nginx`
    pub command: String,
}

pub struct BackupTask {
    category: String,
    sources: Vec<BackupSource>,
    retention: Option<RetentionPolicy>,
    store: Arc<ArtifactStore>,
    executor: Arc<dyn CommandExecutor>,
    command_timeout: Duration,
}

impl BackupTask {
    pub fn new(
        category: impl Into<String>,
        sources: Vec<BackupSource>,
        retention: Option<RetentionPolicy>,
        store: Arc<ArtifactStore>,
        executor: Arc<dyn CommandExecutor>,
        command_timeout: Duration,
    ) -> Self {
        Self {
            category: category.into(),
            sources,
            retention,
            store,
            executor,
            command_timeout,
        }
    }

    async fn run(&self, ctx: &TaskContext) -> EngineResult<Report> {
        let mut report = Report::default();
        let mut failed_sources = Vec::new();

        for (index, source) in self.sources.iter().enumerate() {
            ctx.checkpoint()?;

            let step = format!("source-{}:{}", index, source.label);
            if ctx.is_completed(&step) {
                debug!("Backup source {} already stored by an earlier attempt", source.label);
                report.line(format!("{}: stored by an earlier attempt", source.label));
                continue;
            }

            let output = match self.executor.run(&source.command, self.command_timeout).await {
                Ok(output) => output,
                Err(e) => {
                    warn!("Backup source {} failed: {}", source.label, e);
                    report.line(format!("{}: failed: {}", source.label, e));
                    failed_sources.push(source.label.clone());
                    continue;
                }
            };

            match self.store.write(&self.category, &source.label, &output.stdout).await {
                Ok(artifact) => {
                    ctx.mark_completed(step);
                    report.artifacts_written += 1;
                    report.bytes_written += artifact.size_bytes;
                    report.line(format!(
                        "{}: stored {} ({} bytes)",
                        source.label, artifact.name, artifact.size_bytes
                    ));
                }
                Err(e) => {
                    warn!("Storing backup {} failed: {}", source.label, e);
                    report.line(format!("{}: storage failed: {}", source.label, e));
                    failed_sources.push(source.label.clone());
                }
            }
        }

        ctx.checkpoint()?;

        if let Some(policy) = &self.retention {
            match self.store.prune(&self.category, policy).await {
                Ok(removed) => {
                    report.artifacts_pruned = removed;
                    report.line(format!(
                        "pruned {} artifacts older than {} days",
                        removed, policy.max_age_days
                    ));
                }
                Err(e) => {
                    warn!("Pruning {} failed, continuing: {}", self.category, e);
                    report.line(format!("pruning failed: {}", e));
                }
            }
        }

        match self.store.total_size(&self.category).await {
            Ok(total) => report.line(format!("{} now holds {} bytes", self.category, total)),
            Err(e) => warn!("Could not size {}: {}", self.category, e),
        }

        if !failed_sources.is_empty() {
            let reason = format!(
                "{} of {} backup sources failed: {} ({})",
                failed_sources.len(),
                self.sources.len(),
                failed_sources.join(", "),
                report.summary()
            );
            // Nothing stored yet: a retry repeats no work
            if failed_sources.len() == self.sources.len() {
                return Err(EngineError::Command {
                    command: format!("backup {}", self.category),
                    reason,
                });
            }
            return Err(EngineError::PartialFailure {
                failed: failed_sources,
                reason,
            });
        }

        info!(
            "Backup of {} completed: {} artifacts, {} bytes",
            self.category, report.artifacts_written, report.bytes_written
        );
        Ok(report)
    }
}

#[async_trait]
impl Task for BackupTask {
    fn kind(&self) -> &'static str {
        "backup"
    }

    async fn execute(&self, ctx: &TaskContext) -> EngineResult<Report> {
        self.run(ctx).await
    }
}
