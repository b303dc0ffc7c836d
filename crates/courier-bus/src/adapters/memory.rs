//! # In-Memory Transport
//!
//! Named FIFO queues shared through an [`InMemoryNetwork`]. Sends are
//! enlisted in the caller's transaction context: the message reaches the
//! destination queue only when that context commits, and is dropped if it
//! aborts.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use courier_types::TransportMessage;
use parking_lot::Mutex;
use tracing::debug;

use crate::domain::TransactionContext;
use crate::error::{InitializeError, TransportError};
use crate::ports::{Initializable, Transport};

/// A set of named queues. Clones share the same queues.
#[derive(Clone, Default)]
pub struct InMemoryNetwork {
    queues: Arc<Mutex<HashMap<String, VecDeque<TransportMessage>>>>,
    delivered: Arc<AtomicU64>,
}

impl InMemoryNetwork {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create `address` if it does not exist yet.
    pub fn create_queue(&self, address: &str) {
        self.queues.lock().entry(address.to_string()).or_default();
    }

    #[must_use]
    pub fn has_queue(&self, address: &str) -> bool {
        self.queues.lock().contains_key(address)
    }

    /// Append `message` to `address`, creating the queue if needed.
    pub fn deliver(&self, address: &str, message: TransportMessage) {
        self.queues
            .lock()
            .entry(address.to_string())
            .or_default()
            .push_back(message);
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// Pop the oldest message from `address`.
    pub fn take(&self, address: &str) -> Option<TransportMessage> {
        self.queues.lock().get_mut(address)?.pop_front()
    }

    /// Messages waiting in `address`.
    #[must_use]
    pub fn queue_len(&self, address: &str) -> usize {
        self.queues.lock().get(address).map_or(0, VecDeque::len)
    }

    /// Total messages delivered since creation.
    #[must_use]
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

/// Transport over an [`InMemoryNetwork`].
pub struct InMemoryTransport {
    network: InMemoryNetwork,
    address: Option<String>,
}

impl InMemoryTransport {
    /// Endpoint receiving from `address`. The queue is created by
    /// `initialize()`.
    pub fn new(network: InMemoryNetwork, address: impl Into<String>) -> Self {
        Self {
            network,
            address: Some(address.into()),
        }
    }

    /// Endpoint that can only send.
    pub fn send_only(network: InMemoryNetwork) -> Self {
        Self {
            network,
            address: None,
        }
    }
}

impl Initializable for InMemoryTransport {
    fn initialize(&self) -> Result<(), InitializeError> {
        if let Some(address) = &self.address {
            debug!(address = %address, "Creating input queue");
            self.network.create_queue(address);
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    async fn receive(&self) -> Result<Option<TransportMessage>, TransportError> {
        let Some(address) = &self.address else {
            return Ok(None);
        };

        if !self.network.has_queue(address) {
            return Err(TransportError::ConnectionError(format!(
                "input queue '{address}' does not exist"
            )));
        }

        Ok(self.network.take(address))
    }

    async fn send(
        &self,
        destination: &str,
        message: TransportMessage,
        context: &TransactionContext,
    ) -> Result<(), TransportError> {
        if !self.network.has_queue(destination) {
            return Err(TransportError::Send {
                destination: destination.to_string(),
                reason: "destination queue does not exist".to_string(),
            });
        }

        if context.is_completed() {
            return Err(TransportError::Send {
                destination: destination.to_string(),
                reason: format!("transaction context {} is already completed", context.id()),
            });
        }

        let network = self.network.clone();
        let destination = destination.to_string();
        context.on_committed(move || network.deliver(&destination, message));
        Ok(())
    }

    fn as_initializable(&self) -> Option<&dyn Initializable> {
        Some(self)
    }
}
