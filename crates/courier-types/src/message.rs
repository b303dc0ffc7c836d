//! # Logical and Transport Messages

use std::any::type_name;
use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::headers;

/// Header map carried by both message forms.
pub type Headers = HashMap<String, String>;

/// Errors converting between typed payloads and the logical body.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The typed value could not be converted into a JSON body.
    #[error("Failed to encode payload of type {type_name}: {reason}")]
    Encode {
        type_name: &'static str,
        reason: String,
    },

    /// The body could not be read back as the requested type.
    #[error("Failed to decode payload as {type_name}: {reason}")]
    Decode {
        type_name: &'static str,
        reason: String,
    },
}

/// Application-level message: headers plus an opaque payload.
///
/// The payload is held as a `serde_json::Value` so the core can carry any
/// serializable type without knowing it; the serializer collaborator decides
/// the wire encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalMessage {
    /// Message headers.
    pub headers: Headers,
    /// Opaque payload.
    pub body: serde_json::Value,
}

impl LogicalMessage {
    /// Create a message from raw parts.
    #[must_use]
    pub fn new(headers: Headers, body: serde_json::Value) -> Self {
        Self { headers, body }
    }

    /// Create a message from a typed payload.
    ///
    /// Stamps a fresh [`headers::MESSAGE_ID`] and the payload's type name in
    /// [`headers::MESSAGE_TYPE`].
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Encode`] if the payload cannot be represented
    /// as JSON (e.g. a map with non-string keys).
    pub fn from_payload<T: Serialize + ?Sized>(payload: &T) -> Result<Self, PayloadError> {
        let body = serde_json::to_value(payload).map_err(|e| PayloadError::Encode {
            type_name: type_name::<T>(),
            reason: e.to_string(),
        })?;

        let mut headers = Headers::new();
        headers.insert(headers::MESSAGE_ID.to_string(), Uuid::new_v4().to_string());
        headers.insert(headers::MESSAGE_TYPE.to_string(), type_name::<T>().to_string());

        Ok(Self { headers, body })
    }

    /// Read the payload back as a concrete type.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::Decode`] if the body does not match `T`.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, PayloadError> {
        T::deserialize(&self.body).map_err(|e| PayloadError::Decode {
            type_name: type_name::<T>(),
            reason: e.to_string(),
        })
    }

    /// Get a header value.
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// The payload type name, if stamped.
    #[must_use]
    pub fn message_type(&self) -> Option<&str> {
        self.header(headers::MESSAGE_TYPE)
    }

    /// The message id, if stamped.
    #[must_use]
    pub fn message_id(&self) -> Option<&str> {
        self.header(headers::MESSAGE_ID)
    }
}

/// Serialized message as exchanged with the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportMessage {
    /// Message headers (copied from the logical message, plus encoding info).
    pub headers: Headers,
    /// Serialized payload.
    pub body: Vec<u8>,
}

impl TransportMessage {
    /// Create a transport message from raw parts.
    #[must_use]
    pub fn new(headers: Headers, body: Vec<u8>) -> Self {
        Self { headers, body }
    }

    /// Get a header value.
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// The address replies should go to, if any.
    #[must_use]
    pub fn return_address(&self) -> Option<&str> {
        self.header(headers::RETURN_ADDRESS)
    }
}
