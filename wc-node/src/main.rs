//! WC Node - flush actuator controller
//!
//! Owns exactly one relay and drives it from MQTT commands:
//! - Subscribes to `wc/<node_id>/command`
//! - Flush asserts the relay and arms a single-shot auto-off timer
//! - Publishes `wc/<node_id>/response` acknowledgments and periodic
//!   `wc/<node_id>/status` reports (the host's only liveness signal)
//! - Reconnects on its own after broker or network loss

mod config;
mod controller;
mod relay;
mod runtime;

use anyhow::{Context, Result};
use config::NodeConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = NodeConfig::load().await.context("Failed to load node configuration")?;
    let identity = config.identity();
    info!(
        "🚽 WC node {} starting ({}, {})",
        identity.node_id, identity.room_label, identity.device_class
    );

    let relay = relay::from_config(&config.actuator);
    runtime::run(config, relay).await.context("Node execution failed")?;

    info!("WC node stopped");
    Ok(())
}
