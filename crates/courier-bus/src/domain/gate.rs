//! # Concurrency Gate
//!
//! Counts in-flight message-processing operations against a fixed ceiling.
//!
//! ## Invariants
//!
//! - `0 <= active_slots <= max_slots` at all times
//! - A slot is released exactly once per successful acquisition: the
//!   [`SlotToken`] is the only way to release, and it is consumed (or
//!   dropped) exactly once.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::error;

use crate::error::BusError;

/// Shared slot counter enforcing the parallelism ceiling.
pub struct ConcurrencyGate {
    max_slots: usize,
    active_slots: Mutex<usize>,
}

impl ConcurrencyGate {
    /// Create a gate with `max_slots` slots.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidConfiguration`] if `max_slots` is 0.
    pub fn new(max_slots: usize) -> Result<Arc<Self>, BusError> {
        if max_slots < 1 {
            return Err(BusError::InvalidConfiguration(format!(
                "Max parallelism is {max_slots} which is an invalid value"
            )));
        }

        Ok(Arc::new(Self {
            max_slots,
            active_slots: Mutex::new(0),
        }))
    }

    /// Try to take a slot without waiting.
    ///
    /// Returns `None` when all slots are taken; nothing changes in that case.
    #[must_use]
    pub fn try_acquire(self: &Arc<Self>) -> Option<SlotToken> {
        let mut active = self.active_slots.lock();
        if *active >= self.max_slots {
            return None;
        }
        *active += 1;

        Some(SlotToken {
            gate: Arc::clone(self),
        })
    }

    /// Return a slot to the gate. Equivalent to dropping the token.
    pub fn release(&self, token: SlotToken) {
        debug_assert!(std::ptr::eq(self, Arc::as_ptr(&token.gate)));
        drop(token);
    }

    /// True iff at least one acquired slot has not been released.
    ///
    /// Only meant for shutdown polling, not for flow control.
    #[must_use]
    pub fn has_pending_operations(&self) -> bool {
        *self.active_slots.lock() > 0
    }

    /// Number of slots currently held.
    #[must_use]
    pub fn active_slots(&self) -> usize {
        *self.active_slots.lock()
    }

    /// The configured ceiling.
    #[must_use]
    pub fn max_slots(&self) -> usize {
        self.max_slots
    }

    fn release_slot(&self) {
        let mut active = self.active_slots.lock();
        if *active == 0 {
            // Unreachable through SlotToken; clamp instead of underflowing.
            error!(
                max_slots = self.max_slots,
                "Concurrency gate released more slots than were acquired"
            );
            return;
        }
        *active -= 1;
    }
}

impl fmt::Debug for ConcurrencyGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrencyGate")
            .field("max_slots", &self.max_slots)
            .field("active_slots", &self.active_slots())
            .finish()
    }
}

/// Proof of one acquired slot.
///
/// The slot goes back to the gate when the token is released or dropped,
/// so a panicking or cancelled holder still returns it.
#[must_use = "dropping the token releases the slot immediately"]
pub struct SlotToken {
    gate: Arc<ConcurrencyGate>,
}

impl SlotToken {
    /// Release the slot.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for SlotToken {
    fn drop(&mut self) {
        self.gate.release_slot();
    }
}

impl fmt::Debug for SlotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotToken").finish_non_exhaustive()
    }
}
