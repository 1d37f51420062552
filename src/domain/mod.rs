// Domain layer - Readings, decisions and the signal timing rule
pub mod decision;
pub mod reading;
pub mod signal_policy;
