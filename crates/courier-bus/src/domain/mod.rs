//! Domain layer: the concurrency gate and the transaction context.
//!
//! Neither type performs I/O; the worker and bus drive them.

pub mod gate;
pub mod transaction;

pub use gate::{ConcurrencyGate, SlotToken};
pub use transaction::{TransactionContext, INBOUND_MESSAGE_KEY, LOGICAL_MESSAGE_KEY};
