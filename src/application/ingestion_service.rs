// Ingestion service - Use cases for ingesting readings and querying history
use crate::application::access_control::ApiKeyGate;
use crate::application::error::ServiceError;
use crate::application::traffic_repository::{HistoryFilter, TrafficRepository};
use crate::domain::decision::{Decision, SignalPlan};
use crate::domain::reading::{Reading, ReadingPayload};
use crate::domain::signal_policy::SignalPolicy;
use serde::Serialize;
use std::sync::Arc;

pub const DEFAULT_HISTORY_LIMIT: u32 = 200;
pub const MAX_HISTORY_LIMIT: u32 = 2000;

/// Confirmation returned to the producer once both rows are durable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReceipt {
    pub stored: bool,
    pub decision: SignalPlan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
}

impl HistoryFilter {
    /// Default the limit to 200, clamp it to 2000 and reject anything below 1.
    /// An empty junction id means no filter.
    pub fn resolve(junction_id: Option<String>, limit: Option<i64>) -> Result<Self, ServiceError> {
        let limit = match limit {
            None => DEFAULT_HISTORY_LIMIT,
            Some(l) if l < 1 => {
                return Err(ServiceError::validation(format!(
                    "limit must be at least 1, got {}",
                    l
                )));
            }
            Some(l) => l.min(i64::from(MAX_HISTORY_LIMIT)) as u32,
        };

        Ok(Self {
            junction_id: junction_id.filter(|j| !j.is_empty()),
            limit,
        })
    }
}

#[derive(Clone)]
pub struct IngestionService {
    repository: Arc<dyn TrafficRepository>,
    policy: Arc<dyn SignalPolicy>,
    gate: ApiKeyGate,
}

impl IngestionService {
    pub fn new(
        repository: Arc<dyn TrafficRepository>,
        policy: Arc<dyn SignalPolicy>,
        gate: ApiKeyGate,
    ) -> Self {
        Self {
            repository,
            policy,
            gate,
        }
    }

    pub fn authorize(&self, credential: Option<&str>) -> Result<(), ServiceError> {
        self.gate.authorize(credential)
    }

    pub async fn ingest(
        &self,
        payload: ReadingPayload,
        credential: Option<&str>,
    ) -> Result<IngestReceipt, ServiceError> {
        self.authorize(credential)?;

        // Stored as a SQLite INTEGER
        if i64::try_from(payload.vehicle_count).is_err() {
            return Err(ServiceError::validation(format!(
                "vehicle_count must be at most {}, got {}",
                i64::MAX,
                payload.vehicle_count
            )));
        }

        let plan = self.policy.decide(payload.vehicle_count, payload.avg_speed_kmh);
        let junction_id = payload.junction_id.clone();
        let vehicle_count = payload.vehicle_count;
        let avg_speed_kmh = payload.avg_speed_kmh;

        let (reading, decision) = self
            .repository
            .record_ingestion(payload, plan)
            .await
            .map_err(|e| {
                tracing::error!("Failed to store reading for {}: {:#}", junction_id, e);
                ServiceError::store(e)
            })?;

        tracing::info!(
            reading_id = reading.id,
            decision_id = decision.id,
            "[{}] vehicles={} speed={} -> green={}s ({})",
            junction_id,
            vehicle_count,
            avg_speed_kmh,
            decision.green_seconds,
            decision.reason
        );

        Ok(IngestReceipt {
            stored: true,
            decision: decision.plan(),
        })
    }

    pub async fn list_readings(
        &self,
        junction_id: Option<String>,
        limit: Option<i64>,
    ) -> Result<Vec<Reading>, ServiceError> {
        let filter = HistoryFilter::resolve(junction_id, limit)?;
        tracing::debug!("Listing readings: {:?}", filter);
        self.repository
            .list_readings(filter)
            .await
            .map_err(ServiceError::store)
    }

    pub async fn list_decisions(
        &self,
        junction_id: Option<String>,
        limit: Option<i64>,
    ) -> Result<Vec<Decision>, ServiceError> {
        let filter = HistoryFilter::resolve(junction_id, limit)?;
        tracing::debug!("Listing decisions: {:?}", filter);
        self.repository
            .list_decisions(filter)
            .await
            .map_err(ServiceError::store)
    }

    /// Liveness only; the store is not probed.
    pub fn health(&self) -> HealthStatus {
        HealthStatus { status: "ok" }
    }
}
