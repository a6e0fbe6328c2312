// Common types and utilities for API handlers

use axum::{http::StatusCode, response::Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::constants::engine::RUN_HISTORY_LIMIT;
use crate::errors::EngineError;

// Helper type for API responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, (StatusCode, Json<ApiResponse<()>>)>;

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Maps an engine error onto the HTTP status a client can act on
pub fn error_response(e: &EngineError) -> (StatusCode, Json<ApiResponse<()>>) {
    let status = match e {
        EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
        EngineError::TaskBusy { .. } | EngineError::DuplicateTask { .. } => StatusCode::CONFLICT,
        EngineError::PolicyViolation { .. } | EngineError::Config(_) => StatusCode::BAD_REQUEST,
        EngineError::Storage(crate::errors::StorageError::InvalidName { .. }) => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ApiResponse::error(e.to_string())))
}

pub fn internal_error(e: impl std::fmt::Display) -> (StatusCode, Json<ApiResponse<()>>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::error(e.to_string())),
    )
}

// Query parameters
#[derive(Deserialize)]
pub struct RunsQuery {
    pub task_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    RUN_HISTORY_LIMIT
}
