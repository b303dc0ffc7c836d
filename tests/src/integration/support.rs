//! # Fixtures
//!
//! Endpoint wiring and tracker steps shared by the integration flows.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_bus::adapters::{
    DeserializeStep, HandlerStep, InMemoryNetwork, InMemoryTransport, IncomingStep,
    JsonSerializer, MessageHandler, StepPipeline, TypeBasedRouter,
};
use courier_bus::{Bus, BusConfig, PipelineError, ShutdownNotifier, TransactionContext};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub const SERVER: &str = "it.server";
pub const CLIENT: &str = "it.client";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Request {
    pub id: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Response {
    pub id: u32,
}

/// Bus over `network` receiving from `address`, running `steps` after
/// deserialization, with every `Request` routed to [`SERVER`].
pub fn endpoint(
    network: &InMemoryNetwork,
    address: &str,
    handler: Arc<dyn MessageHandler>,
    config: BusConfig,
    notifier: Option<Arc<dyn ShutdownNotifier>>,
) -> Bus {
    endpoint_with_tracker(network, address, handler, config, notifier, None)
}

pub fn endpoint_with_tracker(
    network: &InMemoryNetwork,
    address: &str,
    handler: Arc<dyn MessageHandler>,
    config: BusConfig,
    notifier: Option<Arc<dyn ShutdownNotifier>>,
    tracker: Option<ConcurrencyTracker>,
) -> Bus {
    let serializer = Arc::new(JsonSerializer);

    let mut pipeline = StepPipeline::new().with_step(DeserializeStep::new(serializer.clone()));
    if let Some(tracker) = tracker {
        pipeline = pipeline.with_step(tracker);
    }
    pipeline = pipeline.with_step(HandlerStep::new(handler));

    let mut builder = Bus::builder()
        .router(Arc::new(TypeBasedRouter::new().map::<Request>(SERVER)))
        .transport(Arc::new(InMemoryTransport::new(network.clone(), address)))
        .serializer(serializer)
        .pipeline(Arc::new(pipeline))
        .config(config);
    if let Some(notifier) = notifier {
        builder = builder.notifier(notifier);
    }
    builder.build().unwrap()
}

/// Replies with a `Response` carrying the request id, after `work`.
pub struct Responder {
    pub work: Duration,
}

#[async_trait]
impl MessageHandler for Responder {
    async fn handle(
        &self,
        message: &courier_types::LogicalMessage,
        context: &TransactionContext,
    ) -> Result<(), PipelineError> {
        let request: Request = message
            .payload()
            .map_err(|e| PipelineError::Handler(e.to_string()))?;
        tokio::time::sleep(self.work).await;
        courier_bus::BusHandle::from_context(context)?
            .reply(&Response { id: request.id })
            .await?;
        Ok(())
    }
}

/// Records every message it sees, with its headers.
#[derive(Default)]
pub struct Collector {
    pub seen: Mutex<Vec<courier_types::LogicalMessage>>,
}

#[async_trait]
impl MessageHandler for Collector {
    async fn handle(
        &self,
        message: &courier_types::LogicalMessage,
        _context: &TransactionContext,
    ) -> Result<(), PipelineError> {
        self.seen.lock().push(message.clone());
        Ok(())
    }
}

impl Collector {
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }
}

/// Sleeps for `work` without replying.
pub struct Sleeper {
    pub work: Duration,
}

#[async_trait]
impl MessageHandler for Sleeper {
    async fn handle(
        &self,
        _message: &courier_types::LogicalMessage,
        _context: &TransactionContext,
    ) -> Result<(), PipelineError> {
        tokio::time::sleep(self.work).await;
        Ok(())
    }
}

/// Pipeline step measuring how many invocations overlap.
#[derive(Clone, Default)]
pub struct ConcurrencyTracker {
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    finished: Arc<AtomicUsize>,
    hold: Duration,
}

impl ConcurrencyTracker {
    pub fn holding(hold: Duration) -> Self {
        Self {
            hold,
            ..Self::default()
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IncomingStep for ConcurrencyTracker {
    fn name(&self) -> &'static str {
        "tracker"
    }

    async fn process(&self, _context: &TransactionContext) -> Result<(), PipelineError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.hold).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Notifier keeping every event for assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    pub infos: Mutex<Vec<String>>,
    pub warnings: Mutex<Vec<(String, Duration)>>,
}

impl ShutdownNotifier for RecordingNotifier {
    fn info(&self, message: &str) {
        self.infos.lock().push(message.to_string());
    }

    fn warn(&self, message: &str, timeout: Duration) {
        self.warnings.lock().push((message.to_string(), timeout));
    }
}

/// Poll `condition` every 10ms, up to `limit`.
pub async fn eventually(limit: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
