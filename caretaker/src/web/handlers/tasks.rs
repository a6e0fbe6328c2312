// Task listing, manual runs, cancellation and run history

use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde_json::{json, Value};
use tracing::{error, info};

use super::common::{error_response, internal_error, ApiResponse, ApiResult, RunsQuery};
use crate::database::TaskRunRecord;
use crate::errors::EngineError;
use crate::registry::TaskSummary;
use crate::scheduler::Trigger;
use crate::tracker::TrackerStatus;
use crate::web::AppState;

pub async fn list_tasks(State(state): State<AppState>) -> ApiResult<Vec<TaskSummary>> {
    Ok(Json(ApiResponse::success(state.engine.tasks().await)))
}

pub async fn get_active_tasks(State(state): State<AppState>) -> ApiResult<TrackerStatus> {
    Ok(Json(ApiResponse::success(state.engine.active().await)))
}

/// Fires the task in the background and returns its run id
pub async fn run_task(
    Path(task_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Value> {
    info!("Manual run requested for {}", task_id);

    match state.engine.fire(&task_id, Trigger::Manual).await {
        Ok(fired) => Ok(Json(ApiResponse::success(json!({
            "task_id": task_id,
            "run_id": fired.run_id,
            "message": format!("Task {} started", task_id),
        })))),
        Err(e) => {
            error!("Failed to start {}: {}", task_id, e);
            Err(error_response(&e))
        }
    }
}

pub async fn cancel_task(
    Path(task_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<Value> {
    info!("Cancellation requested for {}", task_id);

    match state.engine.cancel(&task_id).await {
        Ok(()) => Ok(Json(ApiResponse::success(json!({
            "task_id": task_id,
            "message": format!("Cancellation requested for {}", task_id),
        })))),
        Err(e) => Err(error_response(&e)),
    }
}

pub async fn list_runs(
    Query(query): Query<RunsQuery>,
    State(state): State<AppState>,
) -> ApiResult<Vec<TaskRunRecord>> {
    match state
        .database
        .get_task_runs(query.task_id.as_deref(), query.limit)
        .await
    {
        Ok(runs) => Ok(Json(ApiResponse::success(runs))),
        Err(e) => {
            error!("Failed to load run history: {}", e);
            Err(internal_error(e))
        }
    }
}

pub async fn get_run(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<TaskRunRecord> {
    match state.database.get_task_run(&run_id).await {
        Ok(Some(run)) => Ok(Json(ApiResponse::success(run))),
        Ok(None) => Err(error_response(&EngineError::not_found("Run", run_id))),
        Err(e) => {
            error!("Failed to load run {}: {}", run_id, e);
            Err(internal_error(e))
        }
    }
}
