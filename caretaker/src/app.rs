//! Builds the engine and its collaborators from a loaded [`Config`]

use anyhow::{anyhow, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::alerts::{AlertDispatcher, AlertSink, EscalationTracker, LogFileSink, TracingSink, WebhookSink};
use crate::artifacts::ArtifactStore;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::constants::artifacts::PIPELINE_RUNS_CATEGORY;
use crate::constants::timeouts;
use crate::database::Database;
use crate::engine::Engine;
use crate::exec::{CommandExecutor, ShellExecutor};
use crate::monitor::{CommandRemediator, ExpiryMonitor, OpensslCertificateSource, Remediator};
use crate::pipeline::{CommandStageExecutor, PipelineGate, PipelineService};
use crate::registry::TaskSpec;
use crate::runner::TaskRunner;
use crate::scheduler::CronTrigger;
use crate::tasks::{BackupTask, CertificateTask, PipelineTask};
use crate::web::AppState;

pub struct App {
    pub config: Arc<Config>,
    pub store: Arc<ArtifactStore>,
    pub database: Arc<Database>,
    pub dispatcher: Arc<AlertDispatcher>,
    pub engine: Arc<Engine>,
    pub pipelines: Arc<PipelineService>,
    cron: CronTrigger,
}

impl App {
    pub async fn build(config: Arc<Config>) -> Result<Self> {
        Self::build_with(config, Arc::new(SystemClock), Arc::new(ShellExecutor)).await
    }

    /// Same as [`App::build`] with the clock and command runner supplied
    pub async fn build_with(
        config: Arc<Config>,
        clock: Arc<dyn Clock>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Result<Self> {
        config.validate()?;

        let database = Arc::new(Database::new(&config.database_path).await?);
        info!("Database initialized at {}", config.database_path);

        let store = Arc::new(ArtifactStore::new(&config.data_dir, clock.clone()));
        info!("Artifact store rooted at {}", config.data_dir);

        let dispatcher = Arc::new(AlertDispatcher::new(build_sinks(&config)?));
        info!("Alert sinks: {}", dispatcher.sink_names().join(", "));

        let runner = TaskRunner::new(dispatcher.clone(), Some(database.clone()), clock.clone());
        let engine = Arc::new(Engine::new(runner, clock.clone()));

        let mut cron = CronTrigger::new(config.timezone()?, engine.sender()).await?;

        for backup in &config.backups {
            let task = BackupTask::new(
                backup.category.clone(),
                backup.sources.clone(),
                config.retention_for(&backup.category),
                store.clone(),
                executor.clone(),
                Duration::from_secs(backup.command_timeout_seconds),
            );
            let spec = TaskSpec {
                id: backup.id.clone(),
                schedule: backup.schedule.clone(),
                command_ref: format!("backup:{}", backup.category),
                timeout: Duration::from_secs(backup.timeout_seconds),
                retry_policy: backup.retry,
            };
            register(&engine, &mut cron, spec, Arc::new(task)).await?;
        }

        let escalation = Arc::new(EscalationTracker::new());
        let source = Arc::new(OpensslCertificateSource::new(
            executor.clone(),
            timeouts::CERT_READ,
        ));
        for cert in &config.certificates {
            let remediator = cert.remediation_command.as_ref().map(|template| {
                Arc::new(CommandRemediator::new(
                    executor.clone(),
                    template.clone(),
                    timeouts::REMEDIATION,
                )) as Arc<dyn Remediator>
            });
            let task = CertificateTask::new(
                cert.subjects.clone(),
                cert.warning_days,
                cert.critical_days,
                source.clone(),
                Arc::new(ExpiryMonitor::new(remediator)),
                dispatcher.clone(),
                escalation.clone(),
            )?;
            let spec = TaskSpec {
                id: cert.id.clone(),
                schedule: cert.schedule.clone(),
                command_ref: format!("certificates:{}", cert.subjects.len()),
                timeout: Duration::from_secs(cert.timeout_seconds),
                retry_policy: cert.retry,
            };
            register(&engine, &mut cron, spec, Arc::new(task)).await?;
        }

        let stage_executor = Arc::new(CommandStageExecutor::new(executor.clone()));
        let mut pipelines = PipelineService::new(
            store.clone(),
            dispatcher.clone(),
            Some(database.clone()),
            clock.clone(),
        )
        .with_log_retention(config.retention_for(PIPELINE_RUNS_CATEGORY));
        for pipeline in &config.pipelines {
            let gate = PipelineGate::new(
                pipeline.definition(&config.deploy_branches),
                stage_executor.clone(),
                clock.clone(),
            )?;
            pipelines.add(gate, pipeline.default_params())?;
        }
        let pipelines = Arc::new(pipelines);

        for pipeline in &config.pipelines {
            let task = PipelineTask::new(
                pipelines.clone(),
                pipeline.name.clone(),
                pipeline.default_ref.clone(),
            );
            let spec = TaskSpec {
                id: pipeline.name.clone(),
                schedule: pipeline.schedule.clone(),
                command_ref: format!("pipeline:{}", pipeline.name),
                timeout: Duration::from_secs(pipeline.timeout_seconds),
                retry_policy: pipeline.retry,
            };
            register(&engine, &mut cron, spec, Arc::new(task)).await?;
        }

        info!(
            "Registered {} tasks, {} on a schedule",
            engine.tasks().await.len(),
            cron.scheduled_count()
        );

        Ok(Self {
            config,
            store,
            database,
            dispatcher,
            engine,
            pipelines,
            cron,
        })
    }

    /// Starts the event loop and the cron trigger
    pub async fn start(&self) -> Result<()> {
        if self.engine.spawn_event_loop().await.is_none() {
            warn!("Engine event loop was already running");
        }
        self.cron.start().await
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.cron.shutdown().await
    }

    pub fn state(&self) -> AppState {
        AppState {
            engine: self.engine.clone(),
            store: self.store.clone(),
            database: self.database.clone(),
            pipelines: self.pipelines.clone(),
        }
    }
}

async fn register(
    engine: &Engine,
    cron: &mut CronTrigger,
    spec: TaskSpec,
    task: Arc<dyn crate::tasks::Task>,
) -> Result<()> {
    let id = spec.id.clone();
    let schedule = spec.schedule.clone();

    engine
        .register(spec, task)
        .await
        .map_err(|e| anyhow!("Failed to register {}: {}", id, e))?;

    if let Some(schedule) = schedule {
        cron.schedule(&id, &schedule).await?;
    }
    Ok(())
}

fn build_sinks(config: &Config) -> Result<Vec<Arc<dyn AlertSink>>> {
    let mut sinks: Vec<Arc<dyn AlertSink>> =
        vec![Arc::new(LogFileSink::new(&config.alert_log_path))];

    if config.tracing_sink_enabled {
        sinks.push(Arc::new(TracingSink));
    }

    match config.alarm_webhook_url.as_deref().filter(|url| !url.is_empty()) {
        Some(url) => {
            let webhook = WebhookSink::new(url, timeouts::WEBHOOK)
                .map_err(|e| anyhow!("Invalid webhook sink: {}", e))?;
            sinks.push(Arc::new(webhook));
        }
        None => warn!("No alarm_webhook_url configured; alerts go to the log file only"),
    }

    Ok(sinks)
}
