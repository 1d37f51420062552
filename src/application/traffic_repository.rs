// Repository trait for traffic readings and decisions
use crate::domain::decision::{Decision, SignalPlan};
use crate::domain::reading::{Reading, ReadingPayload};
use async_trait::async_trait;

/// Validated history query passed to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryFilter {
    pub junction_id: Option<String>,
    pub limit: u32,
}

#[async_trait]
pub trait TrafficRepository: Send + Sync {
    /// Append a reading and the decision derived from it as one atomic unit.
    /// Either both rows are committed or neither is.
    async fn record_ingestion(
        &self,
        reading: ReadingPayload,
        plan: SignalPlan,
    ) -> anyhow::Result<(Reading, Decision)>;

    /// Readings newest timestamp first, ties broken by newest insert.
    async fn list_readings(&self, filter: HistoryFilter) -> anyhow::Result<Vec<Reading>>;

    /// Decisions newest timestamp first, ties broken by newest insert.
    async fn list_decisions(&self, filter: HistoryFilter) -> anyhow::Result<Vec<Decision>>;
}
