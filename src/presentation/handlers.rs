// HTTP request handlers
use crate::application::access_control::API_KEY_HEADER;
use crate::application::error::ServiceError;
use crate::application::ingestion_service::{HealthStatus, IngestReceipt};
use crate::domain::decision::Decision;
use crate::domain::reading::{Reading, ReadingPayload};
use crate::presentation::app_state::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub junction_id: Option<String>,
    pub limit: Option<i64>,
}

fn history_query(query: Result<Query<HistoryQuery>, QueryRejection>) -> Result<HistoryQuery, ServiceError> {
    query
        .map(|Query(q)| q)
        .map_err(|rejection| ServiceError::validation(rejection.body_text()))
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    Json(state.ingestion_service.health())
}

/// Ingest one reading and return the decision derived from it
pub async fn ingest_reading(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<ReadingPayload>, JsonRejection>,
) -> Result<Json<IngestReceipt>, ServiceError> {
    let service = &state.ingestion_service;
    let credential = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());

    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            // A bad credential wins over a bad body
            service.authorize(credential)?;
            tracing::debug!("Rejected ingest payload: {}", rejection.body_text());
            return Err(ServiceError::validation(rejection.body_text()));
        }
    };

    service.ingest(payload, credential).await.map(Json)
}

/// List readings, newest first
pub async fn list_readings(
    State(state): State<Arc<AppState>>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<Vec<Reading>>, ServiceError> {
    let query = history_query(query)?;
    state
        .ingestion_service
        .list_readings(query.junction_id, query.limit)
        .await
        .map(Json)
}

/// List decisions, newest first
pub async fn list_decisions(
    State(state): State<Arc<AppState>>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<Vec<Decision>>, ServiceError> {
    let query = history_query(query)?;
    state
        .ingestion_service
        .list_decisions(query.junction_id, query.limit)
        .await
        .map(Json)
}
