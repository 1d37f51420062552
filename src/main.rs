// Main entry point - Dependency injection and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};
use anyhow::Context;
use tracing_subscriber::EnvFilter;

use crate::application::access_control::ApiKeyGate;
use crate::application::ingestion_service::IngestionService;
use crate::domain::signal_policy::ThresholdPolicy;
use crate::infrastructure::config::load_app_config;
use crate::infrastructure::sqlite_repository::SqliteRepository;
use crate::presentation::app_state::AppState;
use crate::presentation::router::build_router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_app_config()?;
    tracing::info!(
        "Loaded configuration: bind_addr={}, store={}",
        config.server.bind_addr,
        config.store.path
    );

    // Create repository (infrastructure layer)
    let repository = Arc::new(SqliteRepository::open(
        &config.store.path,
        config.store.read_pool_size,
    )?);

    // Create services (application layer)
    let gate = ApiKeyGate::new(config.security.api_key.clone());
    let ingestion_service = IngestionService::new(repository, Arc::new(ThresholdPolicy), gate);

    // Create application state
    let state = Arc::new(AppState { ingestion_service });

    // Build router (presentation layer)
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config
        .server
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.server.bind_addr))?;
    tracing::info!("Starting traffic-signal service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
