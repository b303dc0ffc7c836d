//! Message contracts and handlers of the demo.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_bus::adapters::MessageHandler;
use courier_bus::{BusHandle, PipelineError, TransactionContext};
use courier_types::LogicalMessage;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Request sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ping {
    pub seq: u64,
}

/// Reply sent by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pong {
    pub seq: u64,
}

/// Server side: simulates some work, then replies with a matching pong.
pub struct EchoHandler {
    work: Duration,
}

impl EchoHandler {
    pub fn new(work: Duration) -> Self {
        Self { work }
    }
}

#[async_trait]
impl MessageHandler for EchoHandler {
    async fn handle(
        &self,
        message: &LogicalMessage,
        context: &TransactionContext,
    ) -> Result<(), PipelineError> {
        let ping: Ping = message
            .payload()
            .map_err(|e| PipelineError::Handler(e.to_string()))?;

        tokio::time::sleep(self.work).await;

        let bus = BusHandle::from_context(context)?;
        bus.reply(&Pong { seq: ping.seq }).await?;
        debug!(seq = ping.seq, "Replied");
        Ok(())
    }
}

/// Client side: counts pongs.
#[derive(Default)]
pub struct PongCounter {
    received: Arc<AtomicU64>,
}

impl PongCounter {
    pub fn new(received: Arc<AtomicU64>) -> Self {
        Self { received }
    }
}

#[async_trait]
impl MessageHandler for PongCounter {
    async fn handle(
        &self,
        message: &LogicalMessage,
        context: &TransactionContext,
    ) -> Result<(), PipelineError> {
        let pong: Pong = message
            .payload()
            .map_err(|e| PipelineError::Handler(e.to_string()))?;

        // Counted on commit so a failed handler does not count.
        let received = Arc::clone(&self.received);
        context.on_committed(move || {
            received.fetch_add(1, Ordering::SeqCst);
        });
        debug!(seq = pong.seq, "Pong received");
        Ok(())
    }
}
