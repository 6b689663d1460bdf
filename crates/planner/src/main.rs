//! Upgrade Planner - rolling-upgrade planning service
//!
//! Accepts fleet snapshots over HTTP and returns batch plans that keep every
//! application within its disruption budget.

use anyhow::Result;
use planner_lib::{
    health::{components, HealthRegistry},
    observability::{PlannerMetrics, StructuredLogger},
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use upgrade_planner::{api, config::ServiceConfig};

const SERVICE_NAME: &str = "upgrade-planner";
const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting upgrade-planner");

    let config = ServiceConfig::load()?;
    info!(
        port = config.api_port,
        solver = %config.solver,
        deadline_ms = config.deadline_ms,
        "Planner configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::PLANNER).await;
    health_registry.register(components::API).await;

    let metrics = PlannerMetrics::new();

    let logger = StructuredLogger::new(SERVICE_NAME);
    logger.log_startup(SERVICE_VERSION, &config.solver.to_string());

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics,
        logger.clone(),
        config.planner(),
    ));

    health_registry.set_ready(true).await;

    let shutdown_logger = logger.clone();
    let shutdown = async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown_logger.log_shutdown("SIGINT received");
        }
    };

    api::serve(config.api_port, app_state, shutdown).await?;
    info!("Shutting down");

    Ok(())
}
