// =====================================================================================
// File: intel-service/src/main.rs
// Description: AETIM threat intelligence daemon entry point
// =====================================================================================

use core_config::{AppConfig, RuntimeEnvironment};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let environment = RuntimeEnvironment::current();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(environment.default_log_level())),
        )
        .init();

    info!(environment = %environment, "Starting AETIM intel service");

    let config = AppConfig::load().unwrap_or_else(|e| {
        error!(error = %e, "Configuration load failed, using defaults");
        AppConfig::default()
    });

    let state = intel_service::build(config).await?;
    state.start_workers().await?;
    info!("Pipeline workers running; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    state.stop_workers().await;
    info!("AETIM intel service stopped");
    Ok(())
}
