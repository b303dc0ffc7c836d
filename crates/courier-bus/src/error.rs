//! Error types for the bus core.

use courier_types::PayloadError;
use thiserror::Error;

/// Errors surfaced by bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// Configuration rejected at construction time.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A required collaborator was not supplied to the builder.
    #[error("Missing required collaborator: {0}")]
    MissingCollaborator(&'static str),

    /// `reply` was called with no active transaction context.
    #[error("Could not find the current transaction context - replies are only possible from inside a message handler")]
    NotInsideHandler,

    /// The active context lacks data an operation depends on.
    #[error("Missing required context data: {0}")]
    MissingContextData(String),

    /// A collaborator's one-time setup failed.
    #[error("Failed to initialize {component}: {reason}")]
    Initialization {
        component: &'static str,
        reason: String,
    },

    /// Worker names must be non-empty.
    #[error("Worker name must not be empty")]
    InvalidWorkerName,

    /// The bus has already been shut down (or dropped).
    #[error("Bus has been disposed")]
    BusDisposed,

    #[error("Transaction context error: {0}")]
    Context(#[from] ContextError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),
}

/// Errors from transaction context operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContextError {
    /// No item stored under the key.
    #[error("No item with key '{key}' in transaction context")]
    MissingKey { key: String },

    /// An item exists under the key but has a different type.
    #[error("Item '{key}' in transaction context is not a {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    /// The context was already committed or aborted.
    #[error("Transaction context {id} has already been completed")]
    AlreadyCompleted { id: uuid::Uuid },
}

/// Errors from the transport collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Send to '{destination}' failed: {reason}")]
    Send { destination: String, reason: String },

    #[error("Connection error: {0}")]
    ConnectionError(String),
}

/// Errors from the router collaborator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("No destination configured for message type {message_type}")]
    NoDestination { message_type: String },

    #[error("Message carries no type header")]
    MissingMessageType,
}

/// Errors from the serializer collaborator.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("Encode failed: {0}")]
    Encode(String),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error(transparent)]
    Payload(#[from] PayloadError),
}

/// Errors from pipeline invocation.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A step rejected the message.
    #[error("Step '{step}' failed: {reason}")]
    Step { step: &'static str, reason: String },

    /// The application handler failed.
    #[error("Handler failed: {0}")]
    Handler(String),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Serialization(#[from] SerializationError),

    /// A bus operation issued from inside the pipeline failed.
    #[error("Bus operation failed: {0}")]
    Bus(#[source] Box<BusError>),
}

impl From<BusError> for PipelineError {
    fn from(err: BusError) -> Self {
        Self::Bus(Box::new(err))
    }
}

/// Failure reported by a collaborator's `initialize` hook.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct InitializeError(pub String);
