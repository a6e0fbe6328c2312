// Pipeline triggering and run lookup

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Deserialize;
use tracing::{error, info};

use super::common::{error_response, ApiResponse, ApiResult};
use crate::pipeline::{DeployParams, PipelineRun, TriggerEvent, TriggerKind};
use crate::tasks::CancellationFlag;
use crate::web::AppState;

fn default_kind() -> TriggerKind {
    TriggerKind::Manual
}

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    #[serde(default = "default_kind")]
    pub kind: TriggerKind,
    pub git_ref: String,
    #[serde(default)]
    pub selected_stages: Option<Vec<String>>,
    #[serde(default)]
    pub tag_filter: Option<String>,
    /// Overrides the pipeline's default deployment parameters
    #[serde(default)]
    pub params: Option<DeployParams>,
}

pub async fn list_pipelines(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    Ok(Json(ApiResponse::success(state.pipelines.names())))
}

/// Runs the pipeline to completion; a blocked run is a successful request
pub async fn trigger_pipeline(
    Path(name): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<TriggerRequest>,
) -> ApiResult<PipelineRun> {
    info!(
        "Pipeline {} triggered ({:?} on {})",
        name, request.kind, request.git_ref
    );

    let event = TriggerEvent {
        kind: request.kind,
        git_ref: request.git_ref,
        selected_stages: request.selected_stages,
        tag_filter: request.tag_filter,
    };

    match state
        .pipelines
        .trigger(&name, event, request.params, &CancellationFlag::new())
        .await
    {
        Ok(run) => Ok(Json(ApiResponse::success(run))),
        Err(e) => {
            error!("Pipeline {} could not run: {}", name, e);
            Err(error_response(&e))
        }
    }
}

pub async fn get_pipeline_run(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<PipelineRun> {
    match state.pipelines.get_run(&run_id).await {
        Ok(run) => Ok(Json(ApiResponse::success(run))),
        Err(e) => Err(error_response(&e)),
    }
}
