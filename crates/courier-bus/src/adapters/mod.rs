//! Adapters: concrete collaborators for tests, demos and single-process use.
//!
//! - `memory`: in-process queues and a transport over them
//! - `router`: payload-type based routing
//! - `json`: `serde_json` serializer
//! - `pipeline`: ordered incoming steps with handler dispatch

pub mod json;
pub mod memory;
pub mod pipeline;
pub mod router;

pub use json::JsonSerializer;
pub use memory::{InMemoryNetwork, InMemoryTransport};
pub use pipeline::{DeserializeStep, HandlerStep, IncomingStep, MessageHandler, StepPipeline};
pub use router::TypeBasedRouter;
