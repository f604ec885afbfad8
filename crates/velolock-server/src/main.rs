//! # velolock-server
//!
//! HTTP and MQTT bridge for the velolock bicycle lock fleet.
//!
//! This binary provides:
//! - REST API for device commands and fleet status
//! - MQTT publishing of accepted commands and ingestion of device status
//! - Structured logging to file and stdout
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package velolock-server
//!
//! # With an explicit configuration file
//! VELOLOCK_CONFIG=./config.toml ./velolock-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};
use velolock_core::{CommandPublisher, Config, DeviceRegistry, LoggingPublisher, SharedRegistry};
use velolock_server::api;
use velolock_server::logging;
use velolock_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    logging::init(&config.logging)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting velolock-server");

    let registry = DeviceRegistry::shared();
    let publisher = command_publisher(&config, &registry)?;

    let app = api::create_router(AppState::new(registry, publisher));

    let addr = config.server.bind_address();
    let listener = TcpListener::bind(&addr).await?;

    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

#[cfg(feature = "mqtt")]
fn command_publisher(
    config: &Config,
    registry: &SharedRegistry,
) -> anyhow::Result<Arc<dyn CommandPublisher>> {
    if !config.mqtt.enabled {
        warn!("MQTT disabled, commands will only be logged");
        return Ok(Arc::new(LoggingPublisher));
    }

    let (publisher, _listener) = velolock_server::mqtt::connect(&config.mqtt, Arc::clone(registry))?;
    Ok(publisher)
}

#[cfg(not(feature = "mqtt"))]
fn command_publisher(
    config: &Config,
    _registry: &SharedRegistry,
) -> anyhow::Result<Arc<dyn CommandPublisher>> {
    if config.mqtt.enabled {
        warn!("Built without MQTT support, commands will only be logged");
    }
    Ok(Arc::new(LoggingPublisher))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
