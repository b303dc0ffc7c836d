//! # Worker Factory
//!
//! Builds workers that share one [`ConcurrencyGate`] and owns the bounded,
//! best-effort drain that runs when the bus shuts down.
//!
//! ## Shutdown Drain
//!
//! 1. Nothing in flight: return at once.
//! 2. Otherwise wait one poll interval without reporting, and re-check.
//! 3. Still busy: report "waiting", then poll at the same interval.
//! 4. Drained: report "done" and return.
//! 5. Time since the drain started reached `worker_shutdown_timeout`:
//!    warn once and return anyway. In-flight work may be abandoned.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::bus::BusHandle;
use crate::config::BusConfig;
use crate::domain::ConcurrencyGate;
use crate::error::BusError;
use crate::ports::{PipelineInvoker, ShutdownNotifier, Transport};
use crate::worker::Worker;

/// How the shutdown drain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Nothing was in flight when the drain started.
    Idle,
    /// In-flight work finished before the timeout.
    Drained,
    /// The timeout elapsed with work still in flight.
    TimedOut,
}

/// Notifier that reports through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl ShutdownNotifier for TracingNotifier {
    fn info(&self, message: &str) {
        info!("{}", message);
    }

    fn warn(&self, message: &str, timeout: Duration) {
        warn!(timeout_secs = timeout.as_secs_f64(), "{}", message);
    }
}

/// Creates workers bound to one transport, pipeline and gate.
pub struct WorkerFactory {
    transport: Arc<dyn Transport>,
    pipeline: Arc<dyn PipelineInvoker>,
    notifier: Arc<dyn ShutdownNotifier>,
    gate: Arc<ConcurrencyGate>,
    worker_shutdown_timeout: Duration,
    shutdown_poll_interval: Duration,
    idle_backoff: Duration,
}

impl WorkerFactory {
    /// Create a factory.
    ///
    /// # Errors
    ///
    /// [`BusError::InvalidConfiguration`] if `config` fails validation.
    /// Nothing is created in that case.
    pub fn new(
        transport: Arc<dyn Transport>,
        pipeline: Arc<dyn PipelineInvoker>,
        notifier: Arc<dyn ShutdownNotifier>,
        config: &BusConfig,
    ) -> Result<Self, BusError> {
        config.validate()?;
        let gate = ConcurrencyGate::new(config.max_parallelism)?;

        Ok(Self {
            transport,
            pipeline,
            notifier,
            gate,
            worker_shutdown_timeout: config.worker_shutdown_timeout,
            shutdown_poll_interval: config.shutdown_poll_interval,
            idle_backoff: config.idle_backoff,
        })
    }

    /// Construct and start a worker.
    ///
    /// # Errors
    ///
    /// [`BusError::InvalidWorkerName`] if `name` is empty.
    pub fn create_worker(
        &self,
        name: impl Into<String>,
        owner: BusHandle,
    ) -> Result<Worker, BusError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(BusError::InvalidWorkerName);
        }

        let mut worker = Worker::new(
            name,
            Arc::clone(&self.transport),
            Arc::clone(&self.pipeline),
            Arc::clone(&self.gate),
            owner,
            self.idle_backoff,
        );
        worker.start();
        Ok(worker)
    }

    /// The gate shared by every worker of this factory.
    #[must_use]
    pub fn gate(&self) -> &Arc<ConcurrencyGate> {
        &self.gate
    }

    /// Wait, within bounds, for dispatched work to finish.
    ///
    /// Work that finishes within the first poll interval ends the drain as
    /// [`ShutdownOutcome::Drained`] without notifying anyone.
    pub async fn shutdown(&self) -> ShutdownOutcome {
        if !self.gate.has_pending_operations() {
            return ShutdownOutcome::Idle;
        }

        let started = Instant::now();

        // quick chance to finish without reporting anything
        tokio::time::sleep(self.shutdown_poll_interval).await;
        if !self.gate.has_pending_operations() {
            debug!("In-flight operations finished during grace period");
            return ShutdownOutcome::Drained;
        }

        self.notifier.info("Waiting for in-flight operations to finish...");

        loop {
            tokio::time::sleep(self.shutdown_poll_interval).await;

            if !self.gate.has_pending_operations() {
                self.notifier.info("Done");
                return ShutdownOutcome::Drained;
            }

            if started.elapsed() >= self.worker_shutdown_timeout {
                let message = format!(
                    "Not all in-flight operations finished within the shutdown timeout of {:.3} seconds",
                    self.worker_shutdown_timeout.as_secs_f64()
                );
                self.notifier.warn(&message, self.worker_shutdown_timeout);
                return ShutdownOutcome::TimedOut;
            }
        }
    }
}
