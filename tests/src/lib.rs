//! # Courier Test Suite
//!
//! End-to-end flows across the public API of the bus, using the in-memory
//! adapters.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── support.rs        # Shared fixtures (endpoints, trackers)
//!     ├── request_reply.rs  # Send, reply, transactional delivery
//!     ├── scaling.rs        # Worker count and parallelism ceiling
//!     └── shutdown.rs       # Bounded graceful shutdown
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p courier-tests
//! cargo test -p courier-tests integration::shutdown::
//! ```

#![allow(dead_code)]
