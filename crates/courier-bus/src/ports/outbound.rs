//! Outbound Ports (Driven Ports)
//!
//! These traits define what the bus core needs from the components it
//! coordinates but does not implement.

use std::time::Duration;

use async_trait::async_trait;
use courier_types::{LogicalMessage, TransportMessage};

use crate::domain::TransactionContext;
use crate::error::{InitializeError, PipelineError, RoutingError, SerializationError, TransportError};

/// One-time setup hook for collaborators that need it.
///
/// `Bus::start` calls `initialize` once, before any worker runs.
pub trait Initializable: Send + Sync {
    fn initialize(&self) -> Result<(), InitializeError>;
}

/// The wire transport.
///
/// Delivery guarantees are the transport's business. The core assumes at
/// most one message per `receive` call.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Input address of this endpoint, stamped as the return address on
    /// outgoing messages. `None` for send-only endpoints.
    fn address(&self) -> Option<&str>;

    /// Receive one message, or `None` if nothing is available right now.
    async fn receive(&self) -> Result<Option<TransportMessage>, TransportError>;

    /// Send `message` to `destination` as part of `context`.
    ///
    /// Implementations enlist the send in the context (e.g. deliver on
    /// commit); the caller decides when the context commits.
    async fn send(
        &self,
        destination: &str,
        message: TransportMessage,
        context: &TransactionContext,
    ) -> Result<(), TransportError>;

    /// Setup capability, if this transport needs one.
    fn as_initializable(&self) -> Option<&dyn Initializable> {
        None
    }
}

/// Decides where an outgoing message goes.
pub trait Router: Send + Sync {
    fn destination_address(&self, message: &LogicalMessage) -> Result<String, RoutingError>;

    fn as_initializable(&self) -> Option<&dyn Initializable> {
        None
    }
}

/// Converts between logical and transport messages.
pub trait Serializer: Send + Sync {
    fn serialize(&self, message: &LogicalMessage) -> Result<TransportMessage, SerializationError>;

    fn deserialize(&self, message: &TransportMessage) -> Result<LogicalMessage, SerializationError>;

    fn as_initializable(&self) -> Option<&dyn Initializable> {
        None
    }
}

/// Runs the incoming-message pipeline for one received message.
///
/// The context carries the inbound [`TransportMessage`] under
/// [`INBOUND_MESSAGE_KEY`](crate::domain::INBOUND_MESSAGE_KEY). The
/// invocation is also the ambient context while it runs.
#[async_trait]
pub trait PipelineInvoker: Send + Sync {
    async fn invoke(&self, context: &TransactionContext) -> Result<(), PipelineError>;
}

/// Receives the notifications of the shutdown drain.
pub trait ShutdownNotifier: Send + Sync {
    /// Informational progress ("waiting", "done").
    fn info(&self, message: &str);

    /// The drain gave up after `timeout`.
    fn warn(&self, message: &str, timeout: Duration);
}
