// Signal timing policy - maps a reading to a green-phase plan
use super::decision::SignalPlan;

pub const HEAVY_REASON: &str = "Heavy congestion or low speed";
pub const MODERATE_HIGH_REASON: &str = "Moderate-high load";
pub const MODERATE_REASON: &str = "Moderate";
pub const LOW_REASON: &str = "Low load";

const HEAVY_COUNT: u64 = 60;
const LOW_SPEED_KMH: f64 = 15.0;
const MODERATE_HIGH_COUNT: u64 = 45;
const MODERATE_COUNT: u64 = 25;

/// Replaceable decision rule. Implementations must be pure and total.
pub trait SignalPolicy: Send + Sync {
    fn decide(&self, vehicle_count: u64, avg_speed_kmh: f64) -> SignalPlan;
}

/// Fixed four-tier threshold rule. Tiers are checked from most to least
/// congested and the first match wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThresholdPolicy;

impl SignalPolicy for ThresholdPolicy {
    fn decide(&self, vehicle_count: u64, avg_speed_kmh: f64) -> SignalPlan {
        decide(vehicle_count, avg_speed_kmh)
    }
}

/// The threshold rule itself.
pub fn decide(vehicle_count: u64, avg_speed_kmh: f64) -> SignalPlan {
    // NaN speed compares false and falls through to the count tiers
    if vehicle_count >= HEAVY_COUNT || avg_speed_kmh < LOW_SPEED_KMH {
        SignalPlan::new(70, HEAVY_REASON)
    } else if vehicle_count >= MODERATE_HIGH_COUNT {
        SignalPlan::new(55, MODERATE_HIGH_REASON)
    } else if vehicle_count >= MODERATE_COUNT {
        SignalPlan::new(40, MODERATE_REASON)
    } else {
        SignalPlan::new(25, LOW_REASON)
    }
}
