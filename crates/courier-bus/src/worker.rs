//! # Worker
//!
//! One polling loop that receives messages and dispatches their processing.
//!
//! ## State Machine
//!
//! ```text
//! Created ──start()──→ Running ──stop()──→ Stopping ──loop exits──→ Stopped
//! ```
//!
//! ## Loop Iteration
//!
//! 1. Take a slot from the shared [`ConcurrencyGate`]; back off if none.
//! 2. Receive one message; if none (or the receive fails), give the slot
//!    back and back off.
//! 3. Create a [`TransactionContext`] holding the message and spawn the
//!    pipeline invocation as its own task, so the loop moves on at once.
//! 4. When that task finishes: commit on success, abort on failure or
//!    panic, dispose, and release the slot. Always.
//!
//! `stop()` is cooperative: it is observed between iterations and during
//! back-off, never in the middle of a receive or a dispatched invocation.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use courier_types::TransportMessage;
use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::bus::{BusHandle, OWNING_BUS_KEY};
use crate::domain::{ConcurrencyGate, SlotToken, TransactionContext, INBOUND_MESSAGE_KEY};
use crate::ports::{PipelineInvoker, Transport};

/// Lifecycle state of a [`Worker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Created,
    Running,
    Stopping,
    Stopped,
}

/// A named polling loop bound to a transport, a pipeline and a shared gate.
pub struct Worker {
    name: String,
    state: Arc<watch::Sender<WorkerState>>,
    runner: Option<WorkerLoop>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub(crate) fn new(
        name: String,
        transport: Arc<dyn Transport>,
        pipeline: Arc<dyn PipelineInvoker>,
        gate: Arc<ConcurrencyGate>,
        owner: BusHandle,
        idle_backoff: Duration,
    ) -> Self {
        let (state, _) = watch::channel(WorkerState::Created);
        let state = Arc::new(state);

        let runner = WorkerLoop {
            name: name.clone(),
            transport,
            pipeline,
            gate,
            owner,
            idle_backoff,
            state: Arc::clone(&state),
        };

        Self {
            name,
            state,
            runner: Some(runner),
            handle: None,
        }
    }

    /// Worker name, unique within its bus.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// `Created → Running`: spawn the polling loop on the current runtime.
    ///
    /// Does nothing if the worker was already started.
    pub fn start(&mut self) {
        let Some(runner) = self.runner.take() else {
            return;
        };

        self.state.send_replace(WorkerState::Running);
        debug!(worker = %self.name, "Starting worker");
        self.handle = Some(tokio::spawn(runner.run()));
    }

    /// `Running → Stopping`: the loop exits after its current iteration.
    pub fn stop(&self) {
        let changed = self.state.send_if_modified(|state| {
            if *state == WorkerState::Running {
                *state = WorkerState::Stopping;
                true
            } else {
                false
            }
        });

        if changed {
            debug!(worker = %self.name, "Worker stopping");
        }
    }

    /// Stop the worker and wait for its loop to exit.
    ///
    /// Pipeline invocations already dispatched keep running; the worker
    /// factory's shutdown drain bounds the wait for those.
    pub async fn dispose(mut self) {
        self.stop();

        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                error!(worker = %self.name, error = %e, "Worker loop terminated abnormally");
            }
        }

        self.state.send_replace(WorkerState::Stopped);
        debug!(worker = %self.name, "Worker disposed");
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Make sure a forgotten worker does not poll forever.
        self.stop();
    }
}

struct WorkerLoop {
    name: String,
    transport: Arc<dyn Transport>,
    pipeline: Arc<dyn PipelineInvoker>,
    gate: Arc<ConcurrencyGate>,
    owner: BusHandle,
    idle_backoff: Duration,
    state: Arc<watch::Sender<WorkerState>>,
}

impl WorkerLoop {
    async fn run(self) {
        debug!(worker = %self.name, "Worker loop started");

        while self.is_running() {
            let Some(slot) = self.gate.try_acquire() else {
                self.back_off().await;
                continue;
            };

            match self.transport.receive().await {
                Ok(Some(message)) => self.dispatch(message, slot),
                Ok(None) => {
                    slot.release();
                    self.back_off().await;
                }
                Err(e) => {
                    warn!(worker = %self.name, error = %e, "Receive failed");
                    slot.release();
                    self.back_off().await;
                }
            }
        }

        self.state.send_replace(WorkerState::Stopped);
        debug!(worker = %self.name, "Worker loop stopped");
    }

    fn is_running(&self) -> bool {
        *self.state.borrow() == WorkerState::Running
    }

    /// Sleep for the back-off delay, waking early if the worker is stopped.
    async fn back_off(&self) {
        let mut changes = self.state.subscribe();
        tokio::select! {
            _ = tokio::time::sleep(self.idle_backoff) => {}
            _ = changes.changed() => {}
        }
    }

    fn dispatch(&self, message: TransportMessage, slot: SlotToken) {
        let context = TransactionContext::new();
        context.set_item(INBOUND_MESSAGE_KEY, message);
        context.set_item(OWNING_BUS_KEY, self.owner.clone());

        let pipeline = Arc::clone(&self.pipeline);
        let worker = self.name.clone();

        debug!(worker = %worker, context = %context.id(), "Dispatching message");

        tokio::spawn(async move {
            let outcome = AssertUnwindSafe(context.scope(pipeline.invoke(&context)))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(())) => {
                    if let Err(e) = context.commit() {
                        warn!(worker = %worker, error = %e, "Commit after processing failed");
                    }
                }
                Ok(Err(e)) => {
                    warn!(
                        worker = %worker,
                        context = %context.id(),
                        error = %e,
                        "Message processing failed"
                    );
                    abort_after_failure(&worker, &context);
                }
                Err(_) => {
                    error!(worker = %worker, context = %context.id(), "Message processing panicked");
                    abort_after_failure(&worker, &context);
                }
            }

            context.dispose();
            slot.release();
        });
    }
}

fn abort_after_failure(worker: &str, context: &TransactionContext) {
    if let Err(e) = context.abort() {
        warn!(worker = %worker, error = %e, "Abort after failed processing failed");
    }
}
