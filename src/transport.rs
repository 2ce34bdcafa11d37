//! # Upstream link abstraction.
//!
//! The realtime backend is an external collaborator. The supervisor only needs
//! an authenticated duplex link that carries ordered, tagged frames:
//!
//! ```text
//!            Supervisor                               Transport impl
//!   ┌──────────────────────────┐   open(token)   ┌───────────────────────┐
//!   │ connect / reconnect      │ ──────────────► │ websocket, quic, mock │
//!   │                          │ ◄────────────── │                       │
//!   │ Link.outbound (try_send) │ ── Frame ─────► │ writer                │
//!   │ reader task              │ ◄── Inbound ─── │ reader                │
//!   └──────────────────────────┘                 └───────────────────────┘
//! ```
//!
//! ## Rules
//! - `open()` resolves once the link is authenticated, or fails with a
//!   classified [`ConnectionError`] (auth failures must be
//!   [`ConnectionError::Authentication`]).
//! - Outbound frames go through a bounded `mpsc` sender; the supervisor only
//!   uses `try_send`, so it never waits on network I/O.
//! - Dropping the inbound sender (receiver yields `None`) signals a lost link.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::ConnectionError;

/// Frame written to the upstream link.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Start receiving events for `topic`.
    Join {
        /// Topic name, e.g. `orders:store-42`.
        topic: String,
    },
    /// Stop receiving events for `topic`.
    Leave {
        /// Topic name.
        topic: String,
    },
    /// Application message for `topic`.
    Message {
        /// Topic name.
        topic: String,
        /// Opaque payload.
        payload: Value,
    },
    /// Liveness probe; the backend echoes `seq` in [`Inbound::HeartbeatAck`].
    Heartbeat {
        /// Probe sequence number.
        seq: u64,
    },
}

/// Frame read from the upstream link.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Tagged change event for a subscribed topic.
    Change {
        /// Topic the event belongs to.
        topic: String,
        /// Change operation (`INSERT`, `UPDATE`, `DELETE`).
        operation: String,
        /// Change payload.
        payload: Value,
    },
    /// Response to [`Frame::Heartbeat`].
    HeartbeatAck {
        /// Echoed probe sequence number.
        seq: u64,
    },
    /// Error reported by the backend or the transport.
    Error(ConnectionError),
}

/// An open duplex link.
#[derive(Debug)]
pub struct Link {
    /// Outbound frame sender.
    pub outbound: mpsc::Sender<Frame>,
    /// Inbound frame receiver.
    pub inbound: mpsc::Receiver<Inbound>,
}

impl Link {
    /// Creates a link from its two halves.
    pub fn new(outbound: mpsc::Sender<Frame>, inbound: mpsc::Receiver<Inbound>) -> Self {
        Self { outbound, inbound }
    }
}

/// Opens links to the realtime backend.
///
/// Implementations typically spawn their own reader/writer tasks bridging a
/// socket to the two channels of [`Link`].
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Opens and authenticates a new link using the bearer `token`.
    async fn open(&self, token: &str) -> Result<Link, ConnectionError>;

    /// Returns the transport name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
