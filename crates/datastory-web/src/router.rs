//! Axum router: maps URL paths to handlers.

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::analyze::analyze;
use crate::handlers::datasets::{create_dataset, dataset_meta, delete_dataset, list_datasets};
use crate::handlers::figures::get_figure;
use crate::state::{AppState, SharedState};

/// Build and return the full Axum router.
pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.max_upload_bytes;
    let shared: SharedState = Arc::new(state);

    Router::new()
        .route("/api/analyze", post(analyze))
        .route("/api/figures/{name}", get(get_figure))
        .route("/api/datasets", get(list_datasets).post(create_dataset))
        .route("/api/datasets/{id}", axum::routing::delete(delete_dataset))
        .route("/api/datasets/{id}/meta", get(dataset_meta))
        // Middleware
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}
