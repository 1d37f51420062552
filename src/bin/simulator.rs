// Reading simulator - posts synthetic sensor readings to the ingest endpoint
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

const JUNCTIONS: [&str; 4] = ["J1", "J2", "J3", "J4"];

#[derive(Debug, Deserialize, Clone)]
struct SimulatorConfig {
    api_url: String,
    api_key: String,
    tick_seconds: u64,
}

#[derive(Debug, Serialize)]
struct ReadingPayload {
    timestamp: String,
    junction_id: String,
    vehicle_count: u32,
    avg_speed_kmh: f64,
}

#[derive(Debug, Deserialize)]
struct IngestReceipt {
    decision: PlanView,
}

#[derive(Debug, Deserialize)]
struct PlanView {
    green_seconds: u32,
    reason: String,
}

fn load_config() -> anyhow::Result<SimulatorConfig> {
    let settings = config::Config::builder()
        .set_default("api_url", "http://127.0.0.1:8000/ingest")?
        .set_default("api_key", "dev-secret-key")?
        .set_default("tick_seconds", 2_i64)?
        .add_source(config::Environment::with_prefix("SIMULATOR"))
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Rough traffic model: a base load plus a random rush-hour bonus, with
/// speed falling as the count rises.
fn generate_reading<R: Rng>(rng: &mut R, junction_id: &str) -> ReadingPayload {
    let base: i64 = [10, 20, 30, 40][rng.gen_range(0..4)];
    let rush_bonus: i64 = rng.gen_range(0..=35);
    let jitter: i64 = rng.gen_range(-5..=5);
    let vehicle_count = (base + rush_bonus + jitter).max(0) as u32;

    let speed = 50.0 - f64::from(vehicle_count) * 0.5 + rng.gen_range(-2.0..=2.0);
    let avg_speed_kmh = (speed.max(5.0) * 10.0).round() / 10.0;

    ReadingPayload {
        timestamp: Utc::now().to_rfc3339(),
        junction_id: junction_id.to_string(),
        vehicle_count,
        avg_speed_kmh,
    }
}

async fn send_reading(
    client: &reqwest::Client,
    config: &SimulatorConfig,
    payload: &ReadingPayload,
) -> anyhow::Result<()> {
    let response = client
        .post(&config.api_url)
        .header("x-api-key", &config.api_key)
        .json(payload)
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("ingest failed with status {}: {}", status, body);
    }

    let receipt: IngestReceipt = response.json().await?;
    tracing::info!(
        "[{}] vehicles={} speed={} -> green={}s ({})",
        payload.junction_id,
        payload.vehicle_count,
        payload.avg_speed_kmh,
        receipt.decision.green_seconds,
        receipt.decision.reason
    );
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config()?;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;

    tracing::info!(
        "Simulator started, sending readings to {} every {}s",
        config.api_url,
        config.tick_seconds
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(config.tick_seconds.max(1)));
    loop {
        ticker.tick().await;
        for junction_id in JUNCTIONS {
            let payload = generate_reading(&mut rand::thread_rng(), junction_id);
            // No retry; the next tick sends fresh readings
            if let Err(e) = send_reading(&client, &config, &payload).await {
                tracing::warn!("[{}] {:#}", junction_id, e);
            }
        }
    }
}
