//! Typed inbound channel events.
//!
//! Raw [`Inbound::Change`](crate::Inbound::Change) frames are decoded into a
//! closed [`ChannelEvent`] whose variant is chosen by the channel kind. The
//! decoder checks only the envelope (operation name, object payload); the
//! record itself is passed through untouched.

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::time::Instant;

use crate::channels::key::{ChannelKey, ChannelKind};
use crate::error::ConnectionError;

/// Change operation carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    /// Row created.
    Insert,
    /// Row changed.
    Update,
    /// Row removed.
    Delete,
}

impl Operation {
    /// Parses a wire operation name (case-insensitive).
    pub fn parse(op: &str) -> Result<Self, ConnectionError> {
        match op.to_ascii_uppercase().as_str() {
            "INSERT" => Ok(Operation::Insert),
            "UPDATE" => Ok(Operation::Update),
            "DELETE" => Ok(Operation::Delete),
            other => Err(ConnectionError::protocol(format!(
                "unknown operation {other:?}"
            ))),
        }
    }
}

/// Envelope shared by every channel event.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    /// Channel the event arrived on.
    pub key: ChannelKey,
    /// Change operation.
    pub operation: Operation,
    /// Record fields as sent by the backend.
    pub record: Map<String, Value>,
    /// Local receive time.
    pub received_at: Instant,
}

impl ChangeRecord {
    /// Returns a field of the record.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.record.get(name)
    }
}

/// Inbound event, tagged by channel kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Order status change.
    Order(ChangeRecord),
    /// Notification.
    Notification(ChangeRecord),
    /// Presence update.
    Presence(ChangeRecord),
    /// Inventory change.
    Inventory(ChangeRecord),
    /// Location update.
    Location(ChangeRecord),
    /// Chat message.
    Chat(ChangeRecord),
}

impl ChannelEvent {
    /// Decodes a raw change for `key`.
    ///
    /// Fails with [`ConnectionError::Protocol`] if the operation is unknown or
    /// the payload is not a JSON object.
    pub fn decode(
        key: ChannelKey,
        operation: &str,
        payload: Value,
        received_at: Instant,
    ) -> Result<Self, ConnectionError> {
        let operation = Operation::parse(operation)?;
        let record = match payload {
            Value::Object(map) => map,
            Value::Null if operation == Operation::Delete => Map::new(),
            other => {
                return Err(ConnectionError::protocol(format!(
                    "payload for {key} is not an object: {}",
                    type_name(&other)
                )));
            }
        };
        let kind = key.kind();
        let rec = ChangeRecord {
            key,
            operation,
            record,
            received_at,
        };
        Ok(match kind {
            ChannelKind::Order => ChannelEvent::Order(rec),
            ChannelKind::Notification => ChannelEvent::Notification(rec),
            ChannelKind::Presence => ChannelEvent::Presence(rec),
            ChannelKind::Inventory => ChannelEvent::Inventory(rec),
            ChannelKind::Location => ChannelEvent::Location(rec),
            ChannelKind::Chat => ChannelEvent::Chat(rec),
        })
    }

    /// Shared envelope.
    pub fn record(&self) -> &ChangeRecord {
        match self {
            ChannelEvent::Order(r)
            | ChannelEvent::Notification(r)
            | ChannelEvent::Presence(r)
            | ChannelEvent::Inventory(r)
            | ChannelEvent::Location(r)
            | ChannelEvent::Chat(r) => r,
        }
    }

    /// Channel kind of this event.
    pub fn kind(&self) -> ChannelKind {
        match self {
            ChannelEvent::Order(_) => ChannelKind::Order,
            ChannelEvent::Notification(_) => ChannelKind::Notification,
            ChannelEvent::Presence(_) => ChannelKind::Presence,
            ChannelEvent::Inventory(_) => ChannelKind::Inventory,
            ChannelEvent::Location(_) => ChannelKind::Location,
            ChannelEvent::Chat(_) => ChannelKind::Chat,
        }
    }

    /// Change operation.
    pub fn operation(&self) -> Operation {
        self.record().operation
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
