//! Channel layer: keys, decoded events, outbound queues and the registry.
//!
//! ## Contents
//! - [`ChannelKey`], [`ChannelKind`] naming of live channels (`orders:store-42`)
//! - [`ChannelEvent`], [`ChangeRecord`], [`Operation`] decoded inbound changes
//! - [`MessageQueue`], [`QueuedMessage`] drop-oldest outbound buffer
//! - `ChannelRegistry` routing, throttling and buffering (crate-internal;
//!   reached through [`Supervisor`](crate::Supervisor))

mod event;
mod key;
mod queue;
mod registry;

pub use event::{ChangeRecord, ChannelEvent, Operation};
pub use key::{ChannelKey, ChannelKind};
pub use queue::{DrainReport, MessageQueue, QueuedMessage};
pub use registry::{Callback, ChannelStats, Predicate, SubscriptionHandle};

pub(crate) use registry::{ChannelRegistry, SendOutcome};
