//! Shell command execution with a time budget
//!
//! This is the only place the engine spawns processes. Backup sources,
//! certificate reads, remediation and pipeline stages all go through a
//! [`CommandExecutor`], so tests can substitute scripted output.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, warn};

use crate::errors::{EngineError, EngineResult};

#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }
}

#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(
        &self,
        command: &str,
        timeout: Duration,
    ) -> EngineResult<CommandOutput>;
}

/// Runs commands through `sh -c`
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellExecutor;

impl ShellExecutor {
    async fn execute_shell_command(command: &str, timeout: Duration) -> EngineResult<CommandOutput> {
        debug!("Executing command: {}", command);

        let child = AsyncCommand::new("sh")
            .arg("-c")
            .arg(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Command {
                command: command.to_string(),
                reason: format!("failed to spawn: {}", e),
            })?;

        // Dropping the future on timeout drops the child, which kills it
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(EngineError::Command {
                    command: command.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                warn!("Command timed out after {:?}: {}", timeout, command);
                return Err(EngineError::Timeout {
                    operation: command.to_string(),
                    after: timeout,
                });
            }
        };

        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if output.status.success() {
            Ok(CommandOutput {
                stdout: output.stdout,
                stderr,
            })
        } else {
            let stdout = String::from_utf8_lossy(&output.stdout).to_string();
            let detail = if !stderr.trim().is_empty() { stderr } else { stdout };
            Err(EngineError::Command {
                command: command.to_string(),
                reason: format!(
                    "exit code {}: {}",
                    output.status.code().unwrap_or(-1),
                    detail.trim()
                ),
            })
        }
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn run(
        &self,
        command: &str,
        timeout: Duration,
    ) -> EngineResult<CommandOutput> {
        Self::execute_shell_command(command, timeout).await
    }
}

/// Substitutes `{name}` placeholders in a command template
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{}}}", key), value)
    })
}
