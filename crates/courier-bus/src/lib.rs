//! # Courier Bus
//!
//! Concurrency and lifecycle core of the Courier message bus: a bounded
//! worker pool that pulls messages off a transport and runs them through a
//! pipeline without exceeding a parallelism ceiling, plus transactional
//! send/reply tied to the message being handled.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌───────────────────────────────┐
//!   send()/reply() → │             Bus               │
//!                    │  router → serializer → send   │
//!                    └──────────────┬────────────────┘
//!                                   │ set_worker_count()
//!                    ┌──────────────▼────────────────┐
//!                    │        WorkerFactory          │
//!                    │  ┌────────┐ ┌────────┐        │
//!                    │  │Worker 1│ │Worker N│ ...    │
//!                    │  └───┬────┘ └───┬────┘        │
//!                    │      └────┬─────┘             │
//!                    │    ConcurrencyGate (N slots)  │
//!                    └──────────────┬────────────────┘
//!                                   │ spawn per message
//!                         TransactionContext + Pipeline
//! ```
//!
//! - **Domain** (`domain/`): [`ConcurrencyGate`], [`TransactionContext`]
//! - **Ports** (`ports/`): [`Transport`], [`Router`], [`Serializer`],
//!   [`PipelineInvoker`], [`Initializable`], [`ShutdownNotifier`]
//! - **Workers**: [`Worker`], [`WorkerFactory`] (with the shutdown drain)
//! - **Bus**: [`Bus`], [`BusBuilder`], [`BusHandle`]
//! - **Adapters** (`adapters/`): in-memory transport, type router, JSON
//!   serializer, step pipeline
//!
//! ## Invariants
//!
//! - At most `max_parallelism` pipeline invocations run at once per factory
//! - Every acquired slot is released exactly once, even if the pipeline
//!   fails or panics
//! - A transaction context completes at most once and is never shared
//!   between concurrently processed messages
//! - `reply` only works inside an active inbound context

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod bus;
pub mod config;
pub mod domain;
pub mod error;
pub mod factory;
pub mod ports;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use bus::{Bus, BusBuilder, BusHandle, OWNING_BUS_KEY};
pub use config::{BusConfig, BusConfigBuilder};
pub use domain::{ConcurrencyGate, SlotToken, TransactionContext, INBOUND_MESSAGE_KEY, LOGICAL_MESSAGE_KEY};
pub use error::{
    BusError, ContextError, InitializeError, PipelineError, RoutingError, SerializationError,
    TransportError,
};
pub use factory::{ShutdownOutcome, TracingNotifier, WorkerFactory};
pub use ports::{Initializable, PipelineInvoker, Router, Serializer, ShutdownNotifier, Transport};
pub use worker::{Worker, WorkerState};
