//! Payload-type based routing.

use std::any::type_name;
use std::collections::HashMap;

use courier_types::LogicalMessage;

use crate::error::RoutingError;
use crate::ports::Router;

/// Routes by the `MESSAGE_TYPE` header, with an optional fallback address.
#[derive(Debug, Default, Clone)]
pub struct TypeBasedRouter {
    routes: HashMap<String, String>,
    fallback: Option<String>,
}

impl TypeBasedRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Send payloads of type `T` to `address`.
    #[must_use]
    pub fn map<T: ?Sized>(mut self, address: impl Into<String>) -> Self {
        self.routes
            .insert(type_name::<T>().to_string(), address.into());
        self
    }

    /// Destination for types with no explicit route.
    #[must_use]
    pub fn fallback(mut self, address: impl Into<String>) -> Self {
        self.fallback = Some(address.into());
        self
    }
}

impl Router for TypeBasedRouter {
    fn destination_address(&self, message: &LogicalMessage) -> Result<String, RoutingError> {
        let Some(message_type) = message.message_type() else {
            return self.fallback.clone().ok_or(RoutingError::MissingMessageType);
        };

        self.routes
            .get(message_type)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| RoutingError::NoDestination {
                message_type: message_type.to_string(),
            })
    }
}
