//! Well-known header keys.
//!
//! All keys share the `courier-` prefix so they never collide with
//! application headers.

/// Unique id stamped on every outgoing message.
pub const MESSAGE_ID: &str = "courier-msg-id";

/// Fully qualified Rust type name of the payload. Used for routing.
pub const MESSAGE_TYPE: &str = "courier-msg-type";

/// Address that replies to this message must be sent to.
pub const RETURN_ADDRESS: &str = "courier-return-address";

/// On a reply, the `MESSAGE_ID` of the message being replied to.
pub const CORRELATION_ID: &str = "courier-correlation-id";

/// Encoding of the transport message body.
pub const CONTENT_TYPE: &str = "courier-content-type";
