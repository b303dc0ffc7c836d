//! Ports: the collaborator contracts the core depends on.
//!
//! The core never constructs a transport, router, serializer or pipeline;
//! it drives them through these traits.

pub mod outbound;

pub use outbound::{
    Initializable, PipelineInvoker, Router, Serializer, ShutdownNotifier, Transport,
};
