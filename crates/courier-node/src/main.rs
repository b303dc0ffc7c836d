//! # Courier Node
//!
//! Runs the ping/pong demo once and exits.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging from the environment
//! 2. Load the demo and bus configuration
//! 3. Run the scenario (start, send, scale, drain, shut down)
//! 4. Report the summary

use anyhow::Result;
use courier_node::{DemoNode, NodeConfig};
use courier_telemetry::{init_telemetry, TelemetryConfig};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_telemetry(TelemetryConfig::for_node("demo"))?;

    info!("===========================================");
    info!("  Courier Node v{}", env!("CARGO_PKG_VERSION"));
    info!("===========================================");

    let config = NodeConfig::from_env()?;
    info!(
        pings = config.pings,
        workers = config.server_workers,
        peak_workers = config.peak_workers,
        max_parallelism = config.bus.max_parallelism,
        "Loaded configuration"
    );

    let node = DemoNode::new(config)?;
    let summary = node.run().await?;

    if summary.received == summary.sent {
        info!(?summary, "Demo complete");
    } else {
        warn!(?summary, "Demo complete with missing replies");
    }

    Ok(())
}
