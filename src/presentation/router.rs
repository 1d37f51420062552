// Route table and middleware
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{health_check, ingest_reading, list_decisions, list_readings};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub fn build_router(state: Arc<AppState>) -> Router {
    // Read endpoints are unauthenticated; only /ingest checks the API key
    Router::new()
        .route("/health", get(health_check))
        .route("/ingest", post(ingest_reading))
        .route("/readings", get(list_readings))
        .route("/decisions", get(list_decisions))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
