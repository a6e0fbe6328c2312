//! Wires store, dispatcher, database and runner around a manual clock

use caretaker::alerts::{AlertDispatcher, AlertSink};
use caretaker::artifacts::ArtifactStore;
use caretaker::clock::{Clock, ManualClock};
use caretaker::database::Database;
use caretaker::engine::Engine;
use caretaker::pipeline::{PipelineGate, PipelineService, StageExecutor};
use caretaker::runner::TaskRunner;
use std::sync::Arc;
use tempfile::TempDir;

use super::doubles::RecordingSink;
use super::test_data::{deploy_pipeline, staging_params, t0};

pub struct Harness {
    pub temp_dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub store: Arc<ArtifactStore>,
    pub sink: Arc<RecordingSink>,
    pub dispatcher: Arc<AlertDispatcher>,
    pub database: Arc<Database>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_sinks(Vec::new()).await
    }

    /// Extra sinks run alongside the recording sink
    pub async fn with_sinks(extra: Vec<Arc<dyn AlertSink>>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let clock = Arc::new(ManualClock::new(t0()));
        let store = Arc::new(ArtifactStore::new(
            temp_dir.path().join("artifacts"),
            clock.clone(),
        ));

        let sink = RecordingSink::new();
        let mut sinks: Vec<Arc<dyn AlertSink>> = vec![sink.clone()];
        sinks.extend(extra);
        let dispatcher = Arc::new(AlertDispatcher::new(sinks));

        let database = Arc::new(
            Database::new(":memory:")
                .await
                .expect("Failed to open in-memory database"),
        );

        Self {
            temp_dir,
            clock,
            store,
            sink,
            dispatcher,
            database,
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    pub fn runner(&self) -> TaskRunner {
        TaskRunner::new(
            self.dispatcher.clone(),
            Some(self.database.clone()),
            self.clock(),
        )
    }

    pub fn engine(&self) -> Arc<Engine> {
        Arc::new(Engine::new(self.runner(), self.clock()))
    }

    /// Service holding the standard deploy pipeline
    pub fn pipeline_service(&self, executor: Arc<dyn StageExecutor>) -> PipelineService {
        let gate = PipelineGate::new(deploy_pipeline(), executor, self.clock())
            .expect("deploy pipeline is valid");
        let mut service = PipelineService::new(
            self.store.clone(),
            self.dispatcher.clone(),
            Some(self.database.clone()),
            self.clock(),
        );
        service
            .add(gate, staging_params())
            .expect("pipeline added once");
        service
    }
}
