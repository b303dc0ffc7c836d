//! JSON serializer.

use courier_types::{headers, LogicalMessage, TransportMessage};

use crate::error::SerializationError;
use crate::ports::Serializer;

/// Content type stamped on every serialized message.
pub const JSON_CONTENT_TYPE: &str = "application/json;charset=utf-8";

/// Encodes the logical body as UTF-8 JSON and copies headers verbatim.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, message: &LogicalMessage) -> Result<TransportMessage, SerializationError> {
        let body = serde_json::to_vec(&message.body)
            .map_err(|e| SerializationError::Encode(e.to_string()))?;

        let mut headers = message.headers.clone();
        headers.insert(headers::CONTENT_TYPE.to_string(), JSON_CONTENT_TYPE.to_string());

        Ok(TransportMessage::new(headers, body))
    }

    fn deserialize(&self, message: &TransportMessage) -> Result<LogicalMessage, SerializationError> {
        if let Some(content_type) = message.header(headers::CONTENT_TYPE) {
            if content_type != JSON_CONTENT_TYPE {
                return Err(SerializationError::UnsupportedContentType(
                    content_type.to_string(),
                ));
            }
        }

        let body = serde_json::from_slice(&message.body)
            .map_err(|e| SerializationError::Decode(e.to_string()))?;

        Ok(LogicalMessage::new(message.headers.clone(), body))
    }
}
