// Traffic reading domain model
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reading as posted by a sensor producer (wire format).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReadingPayload {
    #[serde(with = "timestamp_format")]
    pub timestamp: DateTime<Utc>,
    pub junction_id: String,
    pub vehicle_count: u64,
    pub avg_speed_kmh: f64,
}

/// A stored reading with its store-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub id: i64,
    #[serde(with = "timestamp_format")]
    pub timestamp: DateTime<Utc>,
    pub junction_id: String,
    pub vehicle_count: u64,
    pub avg_speed_kmh: f64,
}

impl Reading {
    pub fn from_payload(id: i64, payload: ReadingPayload) -> Self {
        Self {
            id,
            timestamp: payload.timestamp,
            junction_id: payload.junction_id,
            vehicle_count: payload.vehicle_count,
            avg_speed_kmh: payload.avg_speed_kmh,
        }
    }
}

/// Timestamp (de)serialization shared by readings and decisions.
///
/// Accepts RFC 3339 with an offset, a naive ISO-8601 date-time taken to be
/// UTC, or a number of seconds since the Unix epoch (values above 2e10 are
/// read as milliseconds). Always emits RFC 3339 in UTC.
pub mod timestamp_format {
    use chrono::{DateTime, Datelike, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    // Fixed width so that lexical order in storage matches chronological order.
    // Only holds for four-digit years, hence the range check in `checked`.
    const STORAGE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";
    const MAX_YEAR: i32 = 9999;
    const EPOCH_MILLIS_THRESHOLD: f64 = 2e10;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Text(String),
        Epoch(f64),
    }

    fn checked(value: DateTime<Utc>, raw: &str) -> Result<DateTime<Utc>, String> {
        if (0..=MAX_YEAR).contains(&value.year()) {
            Ok(value)
        } else {
            Err(format!(
                "invalid timestamp '{}': year must be between 0000 and {}",
                raw, MAX_YEAR
            ))
        }
    }

    pub fn parse(value: &str) -> Result<DateTime<Utc>, String> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return checked(dt.with_timezone(&Utc), value);
        }
        let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
            .map_err(|e| format!("invalid timestamp '{}': {}", value, e))?;
        checked(naive.and_utc(), value)
    }

    pub fn from_epoch(value: f64) -> Result<DateTime<Utc>, String> {
        let raw = value.to_string();
        if !value.is_finite() {
            return Err(format!("invalid timestamp '{}'", raw));
        }
        let seconds = if value.abs() > EPOCH_MILLIS_THRESHOLD {
            value / 1000.0
        } else {
            value
        };
        let micros = (seconds * 1_000_000.0).round();
        if micros.abs() >= i64::MAX as f64 {
            return Err(format!("invalid timestamp '{}': out of range", raw));
        }
        let dt = DateTime::from_timestamp_micros(micros as i64)
            .ok_or_else(|| format!("invalid timestamp '{}': out of range", raw))?;
        checked(dt, &raw)
    }

    pub fn to_storage(value: &DateTime<Utc>) -> String {
        value.format(STORAGE_FORMAT).to_string()
    }

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let parsed = match RawTimestamp::deserialize(deserializer)? {
            RawTimestamp::Text(raw) => parse(&raw),
            RawTimestamp::Epoch(seconds) => from_epoch(seconds),
        };
        parsed.map_err(serde::de::Error::custom)
    }
}
