use crate::web::{handlers, AppState};
use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub async fn start_web_server(state: AppState, host: &str, port: u16) -> Result<()> {
    let app = create_router(state);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server running on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // === TASK ROUTES ===
        .route("/api/tasks", get(handlers::list_tasks))
        .route("/api/tasks/active", get(handlers::get_active_tasks))
        .route("/api/tasks/{task_id}/run", post(handlers::run_task))
        .route("/api/tasks/{task_id}/cancel", post(handlers::cancel_task))
        .route("/api/runs", get(handlers::list_runs))
        .route("/api/runs/{run_id}", get(handlers::get_run))
        // === ARTIFACT ROUTES ===
        .route("/api/artifacts", get(handlers::list_categories))
        .route("/api/artifacts/{category}", get(handlers::list_artifacts))
        // === PIPELINE ROUTES ===
        .route("/api/pipelines", get(handlers::list_pipelines))
        .route(
            "/api/pipelines/{name}/trigger",
            post(handlers::trigger_pipeline),
        )
        .route(
            "/api/pipelines/runs/{run_id}",
            get(handlers::get_pipeline_run),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
