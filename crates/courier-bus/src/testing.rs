//! Test doubles shared by the unit tests of this crate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_types::{headers, Headers, TransportMessage};
use parking_lot::Mutex;

use crate::domain::TransactionContext;
use crate::error::{PipelineError, TransportError};
use crate::ports::{PipelineInvoker, ShutdownNotifier, Transport};

pub(crate) const TEST_ADDRESS: &str = "test-input";

pub(crate) struct NullTransport;

#[async_trait]
impl Transport for NullTransport {
    fn address(&self) -> Option<&str> {
        None
    }

    async fn receive(&self) -> Result<Option<TransportMessage>, TransportError> {
        Ok(None)
    }

    async fn send(
        &self,
        _destination: &str,
        _message: TransportMessage,
        _context: &TransactionContext,
    ) -> Result<(), TransportError> {
        Ok(())
    }
}

pub(crate) struct NullPipeline;

#[async_trait]
impl PipelineInvoker for NullPipeline {
    async fn invoke(&self, _context: &TransactionContext) -> Result<(), PipelineError> {
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    infos: Mutex<Vec<String>>,
    warnings: Mutex<Vec<(String, Duration)>>,
}

impl RecordingNotifier {
    pub(crate) fn infos(&self) -> Vec<String> {
        self.infos.lock().clone()
    }

    pub(crate) fn warnings(&self) -> Vec<(String, Duration)> {
        self.warnings.lock().clone()
    }

    pub(crate) fn warning_count(&self) -> usize {
        self.warnings.lock().len()
    }
}

impl ShutdownNotifier for RecordingNotifier {
    fn info(&self, message: &str) {
        self.infos.lock().push(message.to_string());
    }

    fn warn(&self, message: &str, timeout: Duration) {
        self.warnings.lock().push((message.to_string(), timeout));
    }
}

/// One recorded `Transport::send` call.
#[derive(Clone)]
pub(crate) struct SentMessage {
    pub destination: String,
    pub message: TransportMessage,
    pub context: TransactionContext,
}

/// Transport fed from a preloaded queue that records every send.
#[derive(Default)]
pub(crate) struct QueueTransport {
    inbox: Mutex<VecDeque<TransportMessage>>,
    sent: Mutex<Vec<SentMessage>>,
    receive_calls: AtomicUsize,
    fail_receive: AtomicBool,
}

impl QueueTransport {
    pub(crate) fn push(&self, message: TransportMessage) {
        self.inbox.lock().push_back(message);
    }

    pub(crate) fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub(crate) fn receive_calls(&self) -> usize {
        self.receive_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_receives(&self) {
        self.fail_receive.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for QueueTransport {
    fn address(&self) -> Option<&str> {
        Some(TEST_ADDRESS)
    }

    async fn receive(&self) -> Result<Option<TransportMessage>, TransportError> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_receive.load(Ordering::SeqCst) {
            return Err(TransportError::Receive("broken".to_string()));
        }
        Ok(self.inbox.lock().pop_front())
    }

    async fn send(
        &self,
        destination: &str,
        message: TransportMessage,
        context: &TransactionContext,
    ) -> Result<(), TransportError> {
        self.sent.lock().push(SentMessage {
            destination: destination.to_string(),
            message,
            context: context.clone(),
        });
        Ok(())
    }
}

/// How a [`ScriptedPipeline`] ends each invocation.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Succeed,
    Fail,
    Panic,
}

/// Pipeline that sleeps, records its contexts and peak concurrency, then
/// ends with a fixed outcome.
pub(crate) struct ScriptedPipeline {
    delay: Duration,
    outcome: Outcome,
    active: AtomicUsize,
    peak: AtomicUsize,
    contexts: Mutex<Vec<TransactionContext>>,
}

impl ScriptedPipeline {
    pub(crate) fn new(delay: Duration, outcome: Outcome) -> Self {
        Self {
            delay,
            outcome,
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            contexts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn contexts(&self) -> Vec<TransactionContext> {
        self.contexts.lock().clone()
    }

    pub(crate) fn invocations(&self) -> usize {
        self.contexts.lock().len()
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PipelineInvoker for ScriptedPipeline {
    async fn invoke(&self, context: &TransactionContext) -> Result<(), PipelineError> {
        self.contexts.lock().push(context.clone());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        match self.outcome {
            Outcome::Succeed => Ok(()),
            Outcome::Fail => Err(PipelineError::Handler("scripted failure".to_string())),
            Outcome::Panic => panic!("scripted panic"),
        }
    }
}

pub(crate) fn inbound(return_address: Option<&str>) -> TransportMessage {
    let mut headers = Headers::new();
    headers.insert(headers::MESSAGE_ID.to_string(), "inbound-1".to_string());
    if let Some(address) = return_address {
        headers.insert(headers::RETURN_ADDRESS.to_string(), address.to_string());
    }
    TransportMessage::new(headers, b"\"ping\"".to_vec())
}

/// Poll `condition` every 5ms, up to `limit`.
pub(crate) async fn wait_until(limit: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

pub(crate) fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
