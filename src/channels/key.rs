//! Channel identity.
//!
//! A [`ChannelKey`] pairs a closed [`ChannelKind`] with an open channel name.
//! Its wire form (the upstream topic) is `"{prefix}:{name}"`:
//!
//! ```text
//! ChannelKey { kind: Order, name: "store-42" }  <──►  "orders:store-42"
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;

use crate::error::ConnectionError;

/// Category of a live channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Order status changes.
    Order,
    /// User notifications.
    Notification,
    /// Presence (online/away) updates.
    Presence,
    /// Stock level changes.
    Inventory,
    /// Courier/vehicle location updates.
    Location,
    /// Chat messages.
    Chat,
}

impl ChannelKind {
    /// All kinds, in declaration order.
    pub const ALL: [ChannelKind; 6] = [
        ChannelKind::Order,
        ChannelKind::Notification,
        ChannelKind::Presence,
        ChannelKind::Inventory,
        ChannelKind::Location,
        ChannelKind::Chat,
    ];

    /// Topic prefix for this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            ChannelKind::Order => "orders",
            ChannelKind::Notification => "notifications",
            ChannelKind::Presence => "presence",
            ChannelKind::Inventory => "inventory",
            ChannelKind::Location => "location",
            ChannelKind::Chat => "chat",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.prefix() == prefix)
    }
}

/// Key of one logical channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelKey {
    kind: ChannelKind,
    name: Arc<str>,
}

impl ChannelKey {
    /// Creates a key for channel `name` of the given kind.
    pub fn new(kind: ChannelKind, name: impl Into<Arc<str>>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// Shorthand for an [`ChannelKind::Order`] channel.
    pub fn orders(name: impl Into<Arc<str>>) -> Self {
        Self::new(ChannelKind::Order, name)
    }

    /// Shorthand for a [`ChannelKind::Chat`] channel.
    pub fn chat(name: impl Into<Arc<str>>) -> Self {
        Self::new(ChannelKind::Chat, name)
    }

    /// Channel kind.
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Channel name within its kind.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Upstream topic (`"{prefix}:{name}"`).
    pub fn topic(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.prefix(), self.name)
    }
}

impl FromStr for ChannelKey {
    type Err = ConnectionError;

    fn from_str(topic: &str) -> Result<Self, Self::Err> {
        let (prefix, name) = topic
            .split_once(':')
            .ok_or_else(|| ConnectionError::protocol(format!("topic {topic:?} has no prefix")))?;
        let kind = ChannelKind::from_prefix(prefix).ok_or_else(|| {
            ConnectionError::protocol(format!("unknown channel kind {prefix:?}"))
        })?;
        if name.is_empty() {
            return Err(ConnectionError::protocol(format!(
                "topic {topic:?} has an empty name"
            )));
        }
        Ok(ChannelKey::new(kind, name))
    }
}
