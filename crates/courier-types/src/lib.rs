//! # Courier Types
//!
//! Message types exchanged between the bus core and its collaborators.
//!
//! ## Message Forms
//!
//! - [`LogicalMessage`]: application payload plus string headers, before
//!   serialization. Built fresh for every send and reply.
//! - [`TransportMessage`]: the serialized, header-annotated form handed to
//!   and received from the transport.
//!
//! Well-known header keys live in [`headers`].

pub mod headers;
pub mod message;

pub use message::{Headers, LogicalMessage, PayloadError, TransportMessage};
