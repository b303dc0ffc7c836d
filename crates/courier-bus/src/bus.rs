//! # Bus
//!
//! Top-level coordinator: owns the live worker set, drives collaborator
//! initialization, and exposes `send` / `reply`.
//!
//! ## Lifecycle
//!
//! ```text
//! BusBuilder::build() ──→ Bus ──start(n)──→ running ──shutdown()──→ disposed
//!                                   │
//!                         set_worker_count(k)
//! ```
//!
//! `shutdown()` must be called explicitly. Dropping a running bus only
//! signals its workers to stop and logs a warning; it does not drain.
//!
//! ## Send / Reply
//!
//! Outgoing messages are enlisted in the active transaction context when
//! there is one (inside a handler), and commit with it. Otherwise a
//! throwaway context is created, used for the single transport send, and
//! committed before `send` returns.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use courier_types::{headers, LogicalMessage};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::BusConfig;
use crate::domain::TransactionContext;
use crate::error::{BusError, SerializationError};
use crate::factory::{ShutdownOutcome, TracingNotifier, WorkerFactory};
use crate::ports::{Initializable, PipelineInvoker, Router, Serializer, ShutdownNotifier, Transport};
use crate::worker::Worker;

/// Key under which the worker stores the owning [`BusHandle`] in each
/// inbound transaction context.
pub const OWNING_BUS_KEY: &str = "courier.owning-bus";

struct BusCore {
    router: Arc<dyn Router>,
    transport: Arc<dyn Transport>,
    serializer: Arc<dyn Serializer>,
    factory: WorkerFactory,
    worker_name_prefix: String,
    workers: Mutex<Vec<Worker>>,
    initialized: parking_lot::Mutex<HashSet<&'static str>>,
    started: AtomicBool,
    disposed: AtomicBool,
}

/// The message bus.
pub struct Bus {
    core: Arc<BusCore>,
}

impl Bus {
    /// Start building a bus.
    #[must_use]
    pub fn builder() -> BusBuilder {
        BusBuilder::new()
    }

    /// Initialize collaborators, then run `worker_count` workers.
    ///
    /// Collaborators exposing [`Initializable`] are initialized once, in the
    /// order router, transport, serializer. A collaborator whose setup failed
    /// is retried by the next call; those that succeeded are not. Once all
    /// are initialized, later calls only resize the pool.
    ///
    /// # Errors
    ///
    /// - [`BusError::BusDisposed`] after `shutdown()`
    /// - [`BusError::Initialization`] if a collaborator's setup fails
    pub async fn start(&self, worker_count: usize) -> Result<(), BusError> {
        self.ensure_not_disposed()?;
        info!(workers = worker_count, "Starting bus");

        let core = &self.core;
        core.initialize_once("router", core.router.as_initializable())?;
        core.initialize_once("transport", core.transport.as_initializable())?;
        core.initialize_once("serializer", core.serializer.as_initializable())?;

        self.core.started.store(true, Ordering::SeqCst);
        self.core.resize(worker_count).await?;

        info!(address = ?self.core.transport.address(), "Started");
        Ok(())
    }

    /// Grow or shrink the worker pool to exactly `count` workers.
    ///
    /// New workers are named by ordinal; the most recently added worker is
    /// removed first, and each removed worker's loop has exited before this
    /// returns.
    ///
    /// # Errors
    ///
    /// [`BusError::BusDisposed`] after `shutdown()`, including a shutdown
    /// that raced with this call.
    pub async fn set_worker_count(&self, count: usize) -> Result<(), BusError> {
        self.ensure_not_disposed()?;
        self.core.resize(count).await
    }

    /// Number of live workers.
    pub async fn worker_count(&self) -> usize {
        self.core.workers.lock().await.len()
    }

    /// Names of live workers, oldest first.
    pub async fn worker_names(&self) -> Vec<String> {
        self.core
            .workers
            .lock()
            .await
            .iter()
            .map(|w| w.name().to_string())
            .collect()
    }

    /// Handle for use inside handlers. Does not keep the bus alive.
    #[must_use]
    pub fn handle(&self) -> BusHandle {
        BusHandle {
            core: Arc::downgrade(&self.core),
        }
    }

    /// Send `message` to the address chosen by the router.
    ///
    /// Joins the ambient transaction context if there is one.
    pub async fn send<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), BusError> {
        self.core.send(message, TransactionContext::current()).await
    }

    /// Reply to the message currently being handled.
    ///
    /// # Errors
    ///
    /// - [`BusError::NotInsideHandler`] with no ambient context; the
    ///   transport is not called
    /// - [`BusError::MissingContextData`] if the context has no inbound
    ///   message or it carries no return address
    pub async fn reply<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), BusError> {
        let context = TransactionContext::current().ok_or(BusError::NotInsideHandler)?;
        self.core.reply(message, &context).await
    }

    /// Like [`Bus::send`], with the context passed explicitly.
    pub async fn send_within<T: Serialize + ?Sized>(
        &self,
        context: &TransactionContext,
        message: &T,
    ) -> Result<(), BusError> {
        self.core.send(message, Some(context.clone())).await
    }

    /// Like [`Bus::reply`], with the context passed explicitly.
    pub async fn reply_within<T: Serialize + ?Sized>(
        &self,
        context: &TransactionContext,
        message: &T,
    ) -> Result<(), BusError> {
        self.core.reply(message, context).await
    }

    /// Stop every worker, drain the pool, then wait (bounded) for dispatched
    /// work to finish.
    ///
    /// Exceeding the shutdown timeout is reported but is not an error.
    ///
    /// # Errors
    ///
    /// [`BusError::BusDisposed`] if called more than once.
    pub async fn shutdown(&self) -> Result<ShutdownOutcome, BusError> {
        if self.core.disposed.swap(true, Ordering::SeqCst) {
            return Err(BusError::BusDisposed);
        }
        info!("Stopping bus");

        {
            let workers = self.core.workers.lock().await;
            workers.iter().for_each(Worker::stop);
        }

        self.core.resize(0).await?;
        let outcome = self.core.factory.shutdown().await;

        info!(?outcome, "Bus stopped");
        Ok(outcome)
    }

    fn ensure_not_disposed(&self) -> Result<(), BusError> {
        if self.core.disposed.load(Ordering::SeqCst) {
            return Err(BusError::BusDisposed);
        }
        Ok(())
    }
}

impl Drop for Bus {
    fn drop(&mut self) {
        if !self.core.started.load(Ordering::SeqCst) || self.core.disposed.load(Ordering::SeqCst)
        {
            return;
        }

        warn!("Bus dropped without shutdown(); stopping workers without draining");
        if let Ok(workers) = self.core.workers.try_lock() {
            workers.iter().for_each(Worker::stop);
        }
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("address", &self.core.transport.address())
            .field("disposed", &self.core.disposed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

fn initialize(component: &'static str, target: Option<&dyn Initializable>) -> Result<(), BusError> {
    let Some(target) = target else {
        return Ok(());
    };

    debug!(component, "Initializing");
    target.initialize().map_err(|e| BusError::Initialization {
        component,
        reason: e.to_string(),
    })
}

impl BusCore {
    fn initialize_once(
        &self,
        component: &'static str,
        target: Option<&dyn Initializable>,
    ) -> Result<(), BusError> {
        let mut done = self.initialized.lock();
        if done.contains(component) {
            return Ok(());
        }

        initialize(component, target)?;
        done.insert(component);
        Ok(())
    }

    async fn resize(self: &Arc<Self>, desired: usize) -> Result<(), BusError> {
        info!(desired, "Setting number of workers");
        let mut workers = self.workers.lock().await;

        // shutdown() may have run while we waited for the lock
        if desired > 0 && self.disposed.load(Ordering::SeqCst) {
            return Err(BusError::BusDisposed);
        }

        while workers.len() < desired {
            let name = format!("{} {}", self.worker_name_prefix, workers.len() + 1);
            debug!(worker = %name, "Adding worker");

            let owner = BusHandle {
                core: Arc::downgrade(self),
            };
            workers.push(self.factory.create_worker(name, owner)?);
        }

        while workers.len() > desired {
            let Some(worker) = workers.pop() else {
                break;
            };
            debug!(worker = %worker.name(), "Removing worker");
            worker.dispose().await;
        }

        Ok(())
    }

    fn outgoing<T: Serialize + ?Sized>(&self, message: &T) -> Result<LogicalMessage, BusError> {
        let mut logical = LogicalMessage::from_payload(message).map_err(SerializationError::from)?;

        if let Some(address) = self.transport.address() {
            logical
                .headers
                .insert(headers::RETURN_ADDRESS.to_string(), address.to_string());
        }

        Ok(logical)
    }

    async fn send<T: Serialize + ?Sized>(
        &self,
        message: &T,
        context: Option<TransactionContext>,
    ) -> Result<(), BusError> {
        let logical = self.outgoing(message)?;
        let destination = self.router.destination_address(&logical)?;
        self.inner_send(&destination, logical, context).await
    }

    async fn reply<T: Serialize + ?Sized>(
        &self,
        message: &T,
        context: &TransactionContext,
    ) -> Result<(), BusError> {
        let inbound = context.inbound_message().map_err(|_| {
            BusError::MissingContextData("inbound transport message".to_string())
        })?;

        let return_address = inbound
            .return_address()
            .ok_or_else(|| {
                BusError::MissingContextData(format!(
                    "inbound message has no '{}' header",
                    headers::RETURN_ADDRESS
                ))
            })?
            .to_string();

        let mut logical = self.outgoing(message)?;
        if let Some(id) = inbound.header(headers::MESSAGE_ID) {
            logical
                .headers
                .insert(headers::CORRELATION_ID.to_string(), id.to_string());
        }

        self.inner_send(&return_address, logical, Some(context.clone()))
            .await
    }

    async fn inner_send(
        &self,
        destination: &str,
        logical: LogicalMessage,
        context: Option<TransactionContext>,
    ) -> Result<(), BusError> {
        let transport_message = self.serializer.serialize(&logical)?;

        if let Some(context) = context {
            debug!(destination, context = %context.id(), "Sending within transaction context");
            self.transport
                .send(destination, transport_message, &context)
                .await?;
            return Ok(());
        }

        let context = TransactionContext::new();
        debug!(destination, context = %context.id(), "Sending with ad-hoc transaction context");

        let sent = self
            .transport
            .send(destination, transport_message, &context)
            .await;
        let result = match sent {
            Ok(()) => context.commit().map_err(BusError::from),
            Err(e) => Err(BusError::from(e)),
        };
        context.dispose();
        result
    }
}

/// Weak handle to a bus, stored in every inbound transaction context.
///
/// Lets handlers send and reply without owning the bus.
#[derive(Clone)]
pub struct BusHandle {
    core: Weak<BusCore>,
}

impl BusHandle {
    /// The handle stored in `context` by the worker that dispatched it.
    ///
    /// # Errors
    ///
    /// [`BusError::MissingContextData`] if the context was not created by a
    /// worker.
    pub fn from_context(context: &TransactionContext) -> Result<Self, BusError> {
        context
            .get_item::<BusHandle>(OWNING_BUS_KEY)
            .map(|handle| (*handle).clone())
            .map_err(|_| BusError::MissingContextData("owning bus".to_string()))
    }

    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self { core: Weak::new() }
    }

    fn core(&self) -> Result<Arc<BusCore>, BusError> {
        self.core.upgrade().ok_or(BusError::BusDisposed)
    }

    /// See [`Bus::send`].
    pub async fn send<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), BusError> {
        self.core()?
            .send(message, TransactionContext::current())
            .await
    }

    /// See [`Bus::reply`].
    pub async fn reply<T: Serialize + ?Sized>(&self, message: &T) -> Result<(), BusError> {
        let context = TransactionContext::current().ok_or(BusError::NotInsideHandler)?;
        self.core()?.reply(message, &context).await
    }

    /// See [`Bus::send_within`].
    pub async fn send_within<T: Serialize + ?Sized>(
        &self,
        context: &TransactionContext,
        message: &T,
    ) -> Result<(), BusError> {
        self.core()?.send(message, Some(context.clone())).await
    }

    /// See [`Bus::reply_within`].
    pub async fn reply_within<T: Serialize + ?Sized>(
        &self,
        context: &TransactionContext,
        message: &T,
    ) -> Result<(), BusError> {
        self.core()?.reply(message, context).await
    }
}

impl fmt::Debug for BusHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusHandle")
            .field("alive", &(self.core.strong_count() > 0))
            .finish()
    }
}

/// Builder for [`Bus`]. Every collaborator except the notifier is required.
#[derive(Default)]
pub struct BusBuilder {
    router: Option<Arc<dyn Router>>,
    transport: Option<Arc<dyn Transport>>,
    serializer: Option<Arc<dyn Serializer>>,
    pipeline: Option<Arc<dyn PipelineInvoker>>,
    notifier: Option<Arc<dyn ShutdownNotifier>>,
    config: BusConfig,
}

impl BusBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn router(mut self, router: Arc<dyn Router>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    pub fn pipeline(mut self, pipeline: Arc<dyn PipelineInvoker>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Sink for shutdown drain notifications. Defaults to [`TracingNotifier`].
    pub fn notifier(mut self, notifier: Arc<dyn ShutdownNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn config(mut self, config: BusConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate and assemble the bus. No worker is created here.
    ///
    /// # Errors
    ///
    /// - [`BusError::MissingCollaborator`] for any missing collaborator
    /// - [`BusError::InvalidConfiguration`] if the config fails validation
    pub fn build(self) -> Result<Bus, BusError> {
        let router = self.router.ok_or(BusError::MissingCollaborator("router"))?;
        let transport = self
            .transport
            .ok_or(BusError::MissingCollaborator("transport"))?;
        let serializer = self
            .serializer
            .ok_or(BusError::MissingCollaborator("serializer"))?;
        let pipeline = self
            .pipeline
            .ok_or(BusError::MissingCollaborator("pipeline"))?;
        let notifier = self
            .notifier
            .unwrap_or_else(|| Arc::new(TracingNotifier));

        let factory = WorkerFactory::new(Arc::clone(&transport), pipeline, notifier, &self.config)?;

        Ok(Bus {
            core: Arc::new(BusCore {
                router,
                transport,
                serializer,
                factory,
                worker_name_prefix: self.config.worker_name_prefix,
                workers: Mutex::new(Vec::new()),
                initialized: parking_lot::Mutex::new(HashSet::new()),
                started: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
            }),
        })
    }
}
