pub mod v1;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    middleware,
    routing::get,
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::delivery::http::v1::jobs::{get_job, list_jobs};
use crate::delivery::http::v1::middleware::api_key_middleware;
use crate::delivery::http::v1::properties::{create_property, list_properties};
use crate::AppState;

const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    let properties_api = Router::new()
        .route("/api/v1/properties", get(list_properties).post(create_property))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn_with_state(state.clone(), api_key_middleware));

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/job", get(list_jobs))
        .route("/api/v1/job/{id}", get(get_job))
        .route("/metrics", get(metrics))
        .merge(properties_api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn metrics(State(state): State<Arc<AppState>>) -> String {
    metrics_process::Collector::default().collect();
    state.metrics_handle.render()
}

#[tracing::instrument]
async fn health() -> &'static str {
    "Server is running"
}
