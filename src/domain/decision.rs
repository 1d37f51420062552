// Signal decision domain model
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Green-phase duration and the classification that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignalPlan {
    pub green_seconds: u32,
    pub reason: String,
}

impl SignalPlan {
    pub fn new(green_seconds: u32, reason: impl Into<String>) -> Self {
        Self {
            green_seconds,
            reason: reason.into(),
        }
    }
}

/// A stored decision. `timestamp` and `junction_id` are copied from the
/// reading identified by `reading_id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub id: i64,
    pub reading_id: i64,
    #[serde(with = "crate::domain::reading::timestamp_format")]
    pub timestamp: DateTime<Utc>,
    pub junction_id: String,
    pub green_seconds: u32,
    pub reason: String,
}

impl Decision {
    pub fn plan(&self) -> SignalPlan {
        SignalPlan::new(self.green_seconds, self.reason.clone())
    }
}
