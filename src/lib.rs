//! # channelvisor
//!
//! **Channelvisor** supervises one shared real-time link and the live channels
//! multiplexed over it (order status, notifications, presence, inventory,
//! location, chat).
//!
//! It owns the connection lifecycle, reconnects with exponential backoff and
//! jitter, detects dead links through heartbeats, buffers outbound messages
//! while offline and throttles inbound bursts per channel. Callers never
//! block on network I/O.
//!
//! ## Architecture
//! ```text
//!        subscribe / send / connect / disconnect
//!                         │
//! ┌───────────────────────▼───────────────────────────────────────────┐
//! │  Supervisor (state machine, single shared link)                   │
//! │  - ReconnectScheduler (one pending timer, BackoffPolicy + jitter) │
//! │  - HeartbeatMonitor (probes, timeout, rolling latency)            │
//! │  - ObserverSet (synchronous, guarded state observers)             │
//! │  - ChannelRegistry                                                │
//! │      key ─► subscriptions + ThrottleBucket + MessageQueue         │
//! └───────┬──────────────────────────────────────┬────────────────────┘
//!         │ Frame (Join/Leave/Message/Heartbeat) │ Inbound (Change/Ack/Error)
//!         ▼                                      │
//!   Transport::open(token) ─► Link ──────────────┘
//!
//! diagnostics: Supervisor/Registry ─► Bus ─► SubscriberSet ─► LogWriter, custom
//! ```
//!
//! ### Lifecycle
//! ```text
//! Disconnected ─connect()─► Connecting ─ok─► Connected
//! Connected ─heartbeat timeout | link error─► Reconnecting ─ok─► Connected
//! Reconnecting ─attempts exhausted─► Failed
//! Connecting | Reconnecting ─auth failure─► Failed
//! any ─disconnect()─► Disconnected
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types / traits                           |
//! |-------------------|----------------------------------------------------------|----------------------------------------------|
//! | **Supervision**   | Connection lifecycle, reconnection, heartbeats.          | [`Supervisor`], [`ConnectionState`]          |
//! | **Channels**      | Typed channel keys, decoded events, offline buffering.   | [`ChannelKey`], [`ChannelEvent`], [`MessageQueue`] |
//! | **Policies**      | Backoff, jitter and inbound throttling.                  | [`BackoffPolicy`], [`JitterPolicy`], [`ThrottleGate`] |
//! | **Transport**     | Pluggable upstream link.                                 | [`Transport`], [`Link`], [`Frame`], [`Inbound`] |
//! | **Observability** | State observers and a diagnostic event bus.              | [`Observe`], [`Subscribe`], [`LogWriter`]    |
//! | **Errors**        | Classified connection errors.                            | [`ConnectionError`], [`ErrorClass`]          |
//! | **Configuration** | Centralized settings.                                    | [`Config`]                                   |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use channelvisor::{
//!     ChannelKey, Config, ConnectionError, ConnectionState, Delivery, Link, Supervisor, Transport,
//! };
//!
//! struct Offline;
//!
//! #[async_trait]
//! impl Transport for Offline {
//!     async fn open(&self, _token: &str) -> Result<Link, ConnectionError> {
//!         Err(ConnectionError::auth("no credentials"))
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let sup = Supervisor::builder(Config::default(), Arc::new(Offline)).build();
//!     let key = ChannelKey::orders("store-42");
//!
//!     // Not connected yet: buffered.
//!     assert_eq!(sup.send(&key, serde_json::json!({ "status": "packed" })), Delivery::Queued);
//!
//!     let err = sup.connect().await.unwrap_err();
//!     assert_eq!(err.as_label(), "authentication_failed");
//!     assert_eq!(sup.state(), ConnectionState::Failed);
//!
//!     sup.disconnect();
//!     assert_eq!(sup.connection_state().queue_depth, 0);
//! }
//! ```

mod channels;
mod core;
mod error;
mod events;
mod guard;
mod policies;
mod subscribers;
mod transport;

// ---- Public re-exports ----

pub use channels::{
    Callback, ChangeRecord, ChannelEvent, ChannelKey, ChannelKind, ChannelStats, DrainReport,
    MessageQueue, Operation, Predicate, QueuedMessage, SubscriptionHandle,
};
pub use crate::core::{
    Config, ConnectionSnapshot, ConnectionState, Delivery, LatencyTier, ObserverId, Observe,
    Supervisor, SupervisorBuilder, Transition,
};
pub use error::{ConnectionError, ErrorClass};
pub use events::{Bus, Event, EventKind};
pub use policies::{BackoffPolicy, JitterPolicy, ThrottleBucket, ThrottleGate};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use transport::{Frame, Inbound, Link, Transport};
