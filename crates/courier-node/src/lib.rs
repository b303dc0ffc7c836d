//! # Courier Node
//!
//! Demo node for the Courier bus. Two endpoints share one in-memory
//! network:
//!
//! ```text
//!   client ──Ping{seq}──→ [server queue] ──→ server workers
//!     ↑                                          │
//!     └──────────── [client queue] ←──Pong{seq}──┘  (reply)
//! ```
//!
//! - `handlers/` - Ping/pong messages and their handlers
//! - `node` - Wiring, the scaling scenario and shutdown

pub mod handlers;
pub mod node;

pub use node::{DemoNode, NodeConfig, RunSummary};
