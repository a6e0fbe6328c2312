//! Scripted collaborators for engine tests

use async_trait::async_trait;
use caretaker::alerts::{Alert, AlertSink};
use caretaker::errors::{EngineError, EngineResult, SinkError};
use caretaker::exec::{CommandExecutor, CommandOutput};
use caretaker::monitor::CertificateSource;
use caretaker::pipeline::{StageDefinition, StageExecutor, StageVars};
use caretaker::tasks::{Report, Task, TaskContext};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Keeps every alert it receives
#[derive(Default)]
pub struct RecordingSink {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.alerts.lock().unwrap().len()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, alert: &Alert) -> Result<(), SinkError> {
        self.alerts.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

/// Refuses every alert
pub struct FailingSink;

#[async_trait]
impl AlertSink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    async fn send(&self, _alert: &Alert) -> Result<(), SinkError> {
        Err(SinkError::new("failing", "connection refused"))
    }
}

#[derive(Clone)]
pub enum MockResponse {
    Output(Vec<u8>),
    Fail(String),
    Hang,
}

/// Answers commands by the first registered pattern they contain; commands
/// matching nothing succeed with empty output
#[derive(Default)]
pub struct MockExecutor {
    responses: Mutex<Vec<(String, MockResponse)>>,
    calls: Mutex<Vec<String>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, pattern: &str, response: MockResponse) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push((pattern.to_string(), response));
        self
    }

    pub fn output(self, pattern: &str, stdout: &str) -> Self {
        self.on(pattern, MockResponse::Output(stdout.as_bytes().to_vec()))
    }

    pub fn failing(self, pattern: &str, reason: &str) -> Self {
        self.on(pattern, MockResponse::Fail(reason.to_string()))
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandExecutor for MockExecutor {
    async fn run(
        &self,
        command: &str,
        timeout: Duration,
    ) -> EngineResult<CommandOutput> {
        self.calls.lock().unwrap().push(command.to_string());
        let response = self
            .responses
            .lock()
            .unwrap()
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, response)| response.clone());

        match response {
            None => Ok(CommandOutput::default()),
            Some(MockResponse::Output(stdout)) => Ok(CommandOutput {
                stdout,
                stderr: String::new(),
            }),
            Some(MockResponse::Fail(reason)) => Err(EngineError::Command {
                command: command.to_string(),
                reason,
            }),
            Some(MockResponse::Hang) => {
                tokio::time::sleep(timeout).await;
                Err(EngineError::Timeout {
                    operation: command.to_string(),
                    after: timeout,
                })
            }
        }
    }
}

/// Fixed certificate end dates per subject; unknown subjects are unreadable
#[derive(Default)]
pub struct StaticCertificateSource {
    dates: HashMap<String, DateTime<Utc>>,
}

impl StaticCertificateSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, subject: &str, not_after: DateTime<Utc>) -> Self {
        self.dates.insert(subject.to_string(), not_after);
        self
    }
}

#[async_trait]
impl CertificateSource for StaticCertificateSource {
    async fn not_after(&self, subject: &str) -> EngineResult<DateTime<Utc>> {
        self.dates.get(subject).copied().ok_or_else(|| EngineError::Command {
            command: format!("read {}", subject),
            reason: "connection refused".to_string(),
        })
    }
}

/// Passes every stage except the ones named failing; records what ran
#[derive(Default)]
pub struct ScriptedStageExecutor {
    failing: HashSet<String>,
    executed: Mutex<Vec<String>>,
    commands: Mutex<Vec<String>>,
}

impl ScriptedStageExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, stage: &str) -> Self {
        self.failing.insert(stage.to_string());
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl StageExecutor for ScriptedStageExecutor {
    async fn execute(
        &self,
        stage: &StageDefinition,
        vars: &StageVars,
    ) -> EngineResult<String> {
        self.executed.lock().unwrap().push(stage.name.clone());
        let command = vars.render(&stage.command);
        self.commands.lock().unwrap().push(command.clone());

        if self.failing.contains(&stage.name) {
            Err(EngineError::Command {
                command,
                reason: "exit code 2: stage failed".to_string(),
            })
        } else {
            Ok(format!("{} ok", stage.name))
        }
    }
}

/// Fails with a retryable error a fixed number of times, then succeeds
pub struct FlakyTask {
    failures: u32,
    calls: AtomicU32,
}

impl FlakyTask {
    pub fn new(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            failures,
            calls: AtomicU32::new(0),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Task for FlakyTask {
    fn kind(&self) -> &'static str {
        "flaky"
    }

    async fn execute(&self, ctx: &TaskContext) -> EngineResult<Report> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(EngineError::Other(format!(
                "transient failure on attempt {}",
                ctx.attempt
            )));
        }
        let mut report = Report::default();
        report.line(format!("succeeded on attempt {}", ctx.attempt));
        Ok(report)
    }
}

/// Sleeps for a while, checking for cancellation between slices
pub struct SlowTask {
    slices: u32,
    slice: Duration,
    calls: AtomicU32,
    surfaces_failures: bool,
}

impl SlowTask {
    pub fn new(slices: u32, slice: Duration) -> Arc<Self> {
        Arc::new(Self {
            slices,
            slice,
            calls: AtomicU32::new(0),
            surfaces_failures: false,
        })
    }

    pub fn alerting(slices: u32, slice: Duration) -> Arc<Self> {
        Arc::new(Self {
            slices,
            slice,
            calls: AtomicU32::new(0),
            surfaces_failures: true,
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Task for SlowTask {
    fn kind(&self) -> &'static str {
        "slow"
    }

    async fn execute(&self, ctx: &TaskContext) -> EngineResult<Report> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for _ in 0..self.slices {
            ctx.checkpoint()?;
            tokio::time::sleep(self.slice).await;
        }
        Ok(Report::default())
    }

    fn surfaces_failures(&self) -> bool {
        self.surfaces_failures
    }
}

/// Fails with a non-retryable error
pub struct MisconfiguredTask;

#[async_trait]
impl Task for MisconfiguredTask {
    fn kind(&self) -> &'static str {
        "misconfigured"
    }

    async fn execute(&self, _ctx: &TaskContext) -> EngineResult<Report> {
        Err(EngineError::policy("thresholds out of order"))
    }
}

/// Panics on every execution
pub struct PanickingTask;

#[async_trait]
impl Task for PanickingTask {
    fn kind(&self) -> &'static str {
        "panicking"
    }

    async fn execute(&self, _ctx: &TaskContext) -> EngineResult<Report> {
        panic!("backup index corrupted");
    }
}
