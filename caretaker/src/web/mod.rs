pub mod handlers;
pub mod server;

pub use server::{create_router, start_web_server};

use std::sync::Arc;

use crate::artifacts::ArtifactStore;
use crate::database::Database;
use crate::engine::Engine;
use crate::pipeline::PipelineService;

// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub store: Arc<ArtifactStore>,
    pub database: Arc<Database>,
    pub pipelines: Arc<PipelineService>,
}
