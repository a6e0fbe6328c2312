// Artifact store browsing

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::Serialize;

use super::common::{error_response, ApiResponse, ApiResult};
use crate::artifacts::Artifact;
use crate::web::AppState;

#[derive(Debug, Serialize)]
pub struct CategoryListing {
    pub category: String,
    pub total_bytes: u64,
    pub artifacts: Vec<Artifact>,
}

pub async fn list_categories(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    match state.store.categories().await {
        Ok(categories) => Ok(Json(ApiResponse::success(categories))),
        Err(e) => Err(error_response(&e)),
    }
}

/// Newest first
pub async fn list_artifacts(
    Path(category): Path<String>,
    State(state): State<AppState>,
) -> ApiResult<CategoryListing> {
    let artifacts = state
        .store
        .list(&category)
        .await
        .map_err(|e| error_response(&e))?;
    let total_bytes = artifacts.iter().map(|a| a.size_bytes).sum();

    Ok(Json(ApiResponse::success(CategoryListing {
        category,
        total_bytes,
        artifacts,
    })))
}
