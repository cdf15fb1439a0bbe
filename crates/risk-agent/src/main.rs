//! Risk Agent - NEO collision-risk scoring service
//!
//! Loads or trains the scoring network in the background and serves
//! predictions, health probes and metrics over HTTP.

use anyhow::Result;
use risk_agent::{api, config::AgentConfig};
use risk_lib::{
    health::{components, HealthRegistry},
    observability::StructuredLogger,
    predictor::PredictorRuntime,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = AgentConfig::load()?;
    let logger = StructuredLogger::new(&config.service_name);
    logger.log_startup(AGENT_VERSION, &config.artifact_dir.display().to_string());

    let health_registry = HealthRegistry::new();
    health_registry.register(components::RUNTIME).await;
    health_registry.register(components::ARTIFACT_STORE).await;

    if let Err(e) = tokio::fs::create_dir_all(&config.artifact_dir).await {
        warn!(
            error = %e,
            dir = %config.artifact_dir.display(),
            "Artifact directory unavailable"
        );
        health_registry
            .set_unhealthy(components::ARTIFACT_STORE, e.to_string())
            .await;
    } else {
        health_registry
            .set_healthy(components::ARTIFACT_STORE)
            .await;
    }

    let runtime = PredictorRuntime::new(
        config.runtime_config(),
        config.capabilities(),
        config.stores(),
    );
    let app_state = Arc::new(api::AppState::new(runtime.clone(), health_registry.clone()));

    // Warm up in the background; the fallback serves until then
    let warmup_state = app_state.clone();
    tokio::spawn(async move {
        let state = warmup_state.runtime.init().await;
        warmup_state.refresh_runtime_health().await;
        warmup_state.health_registry.set_ready(true).await;
        info!(state = %state, "Runtime initialized");
    });

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state, async move {
        let _ = shutdown_rx.changed().await;
    }));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    runtime.shutdown().await;
    let _ = shutdown_tx.send(true);

    match api_handle.await {
        Ok(Err(e)) => warn!(error = %e, "API server exited with error"),
        Err(e) => warn!(error = %e, "API server task failed"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}
