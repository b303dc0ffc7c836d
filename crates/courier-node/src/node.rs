//! Demo node wiring and scenario.
//!
//! ## Scenario
//!
//! 1. Start the server with `server_workers` workers and the client with one
//! 2. Send the first half of the pings
//! 3. Scale the server up to `peak_workers`, send the rest
//! 4. Wait for every pong (bounded by `reply_timeout`)
//! 5. Scale the server back to one worker
//! 6. Shut both endpoints down

use std::env;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use courier_bus::adapters::{
    DeserializeStep, HandlerStep, InMemoryNetwork, InMemoryTransport, JsonSerializer, StepPipeline,
    TypeBasedRouter,
};
use courier_bus::{Bus, BusConfig, BusError, ShutdownOutcome};
use courier_telemetry::endpoint_span;
use tracing::{info, warn, Instrument};

use crate::handlers::{EchoHandler, PongCounter, Ping};

pub const SERVER_ADDRESS: &str = "courier.server";
pub const CLIENT_ADDRESS: &str = "courier.client";

/// Demo parameters.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub pings: u64,
    pub server_workers: usize,
    pub peak_workers: usize,
    pub handler_work: Duration,
    pub reply_timeout: Duration,
    pub bus: BusConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            pings: 20,
            server_workers: 2,
            peak_workers: 5,
            handler_work: Duration::from_millis(50),
            reply_timeout: Duration::from_secs(10),
            bus: BusConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Defaults overridden by `COURIER_DEMO_PINGS`, `COURIER_DEMO_WORKERS`,
    /// `COURIER_DEMO_PEAK_WORKERS` and the `BusConfig` variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self {
            bus: BusConfig::from_env().context("Invalid bus configuration")?,
            ..Self::default()
        };

        if let Ok(pings) = env::var("COURIER_DEMO_PINGS") {
            config.pings = pings.parse().context("COURIER_DEMO_PINGS")?;
        }
        if let Ok(workers) = env::var("COURIER_DEMO_WORKERS") {
            config.server_workers = workers.parse().context("COURIER_DEMO_WORKERS")?;
        }
        if let Ok(workers) = env::var("COURIER_DEMO_PEAK_WORKERS") {
            config.peak_workers = workers.parse().context("COURIER_DEMO_PEAK_WORKERS")?;
        }

        Ok(config)
    }
}

/// What a run observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub sent: u64,
    pub received: u64,
    pub peak_workers: usize,
    pub server_shutdown: ShutdownOutcome,
    pub client_shutdown: ShutdownOutcome,
}

/// A server and a client bus over one in-memory network.
pub struct DemoNode {
    config: NodeConfig,
    network: InMemoryNetwork,
    server: Bus,
    client: Bus,
    pongs: Arc<AtomicU64>,
}

impl DemoNode {
    pub fn new(config: NodeConfig) -> Result<Self, BusError> {
        let network = InMemoryNetwork::new();
        let serializer = Arc::new(JsonSerializer);
        let pongs = Arc::new(AtomicU64::new(0));

        let server = Bus::builder()
            .router(Arc::new(TypeBasedRouter::new()))
            .transport(Arc::new(InMemoryTransport::new(network.clone(), SERVER_ADDRESS)))
            .serializer(serializer.clone())
            .pipeline(Arc::new(
                StepPipeline::new()
                    .with_step(DeserializeStep::new(serializer.clone()))
                    .with_step(HandlerStep::new(Arc::new(EchoHandler::new(
                        config.handler_work,
                    )))),
            ))
            .config(config.bus.clone())
            .build()?;

        let client = Bus::builder()
            .router(Arc::new(TypeBasedRouter::new().map::<Ping>(SERVER_ADDRESS)))
            .transport(Arc::new(InMemoryTransport::new(network.clone(), CLIENT_ADDRESS)))
            .serializer(serializer.clone())
            .pipeline(Arc::new(
                StepPipeline::new()
                    .with_step(DeserializeStep::new(serializer))
                    .with_step(HandlerStep::new(Arc::new(PongCounter::new(Arc::clone(
                        &pongs,
                    ))))),
            ))
            .config(config.bus.clone())
            .build()?;

        Ok(Self {
            config,
            network,
            server,
            client,
            pongs,
        })
    }

    /// Pongs counted so far.
    pub fn pongs(&self) -> u64 {
        self.pongs.load(Ordering::SeqCst)
    }

    /// Run the scenario and shut both endpoints down.
    pub async fn run(self) -> Result<RunSummary> {
        let config = &self.config;

        self.server
            .start(config.server_workers)
            .instrument(endpoint_span!("server"))
            .await
            .context("Failed to start server")?;
        self.client
            .start(1)
            .instrument(endpoint_span!("client"))
            .await
            .context("Failed to start client")?;

        let half = config.pings / 2;
        self.send_pings(0..half).await?;

        self.server
            .set_worker_count(config.peak_workers)
            .instrument(endpoint_span!("server"))
            .await?;
        let peak_workers = self.server.worker_count().await;
        info!(workers = peak_workers, "Scaled server up");

        self.send_pings(half..config.pings).await?;

        if !self.wait_for_pongs(config.pings).await {
            warn!(
                expected = config.pings,
                received = self.pongs(),
                "Timed out waiting for replies"
            );
        }

        self.server
            .set_worker_count(1)
            .instrument(endpoint_span!("server"))
            .await?;
        info!(workers = ?self.server.worker_names().await, "Scaled server down");

        let client_shutdown = self
            .client
            .shutdown()
            .instrument(endpoint_span!("client"))
            .await?;
        let server_shutdown = self
            .server
            .shutdown()
            .instrument(endpoint_span!("server"))
            .await?;

        info!(
            delivered = self.network.delivered_count(),
            "Network totals"
        );

        Ok(RunSummary {
            sent: config.pings,
            received: self.pongs(),
            peak_workers,
            server_shutdown,
            client_shutdown,
        })
    }

    async fn send_pings(&self, range: std::ops::Range<u64>) -> Result<()> {
        for seq in range {
            self.client
                .send(&Ping { seq })
                .await
                .with_context(|| format!("Failed to send ping {seq}"))?;
        }
        Ok(())
    }

    async fn wait_for_pongs(&self, expected: u64) -> bool {
        let deadline = tokio::time::Instant::now() + self.config.reply_timeout;
        while tokio::time::Instant::now() < deadline {
            if self.pongs() >= expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.pongs() >= expected
    }
}
