//! # Connection state, transitions and quality snapshots.
//!
//! [`ConnectionState`] is owned by the supervisor and changes only through its
//! transition function. Every change produces a [`Transition`], which is
//! delivered synchronously to observers and mirrored on the event bus.
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──ok──► Connected
//! Connected ──heartbeat timeout | link error──► Reconnecting ──ok──► Connected
//! Reconnecting ──attempts exhausted──► Failed
//! Connecting | Reconnecting ──auth failure──► Failed
//! any ──disconnect()──► Disconnected
//! ```

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::error::ConnectionError;

/// Lifecycle state of the shared link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No link and nothing scheduled.
    #[default]
    Disconnected,
    /// First attempt of a session in flight.
    Connecting,
    /// Link is up; heartbeats running.
    Connected,
    /// Link lost; the scheduler owns the next attempt.
    Reconnecting,
    /// Terminal until an explicit `connect()`.
    Failed,
}

impl ConnectionState {
    /// Stable lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        }
    }

    /// True while an attempt is in flight or scheduled.
    pub fn is_pending(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Reconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One state change, as seen by observers.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// Per-supervisor sequence number, starting at 1.
    pub seq: u64,
    /// Previous state.
    pub from: ConnectionState,
    /// New state.
    pub to: ConnectionState,
    /// Error that caused the change, if any.
    pub error: Option<ConnectionError>,
    /// When the change happened.
    pub at: Instant,
}

/// Classification of the rolling average heartbeat latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyTier {
    /// Under 100 ms.
    Excellent,
    /// Under 300 ms.
    Good,
    /// Under 1000 ms.
    Fair,
    /// 1000 ms or more.
    Poor,
    /// No samples yet.
    Unknown,
}

impl LatencyTier {
    /// Classifies an average latency.
    pub fn classify(avg: Option<Duration>) -> Self {
        match avg.map(|d| d.as_millis()) {
            None => LatencyTier::Unknown,
            Some(ms) if ms < 100 => LatencyTier::Excellent,
            Some(ms) if ms < 300 => LatencyTier::Good,
            Some(ms) if ms < 1000 => LatencyTier::Fair,
            Some(_) => LatencyTier::Poor,
        }
    }
}

/// Point-in-time view returned by `Supervisor::connection_state()`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSnapshot {
    /// Current state.
    pub state: ConnectionState,
    /// Rolling average of the last heartbeat round trips.
    pub latency: Option<Duration>,
    /// Tier derived from `latency`.
    pub quality: LatencyTier,
    /// Messages buffered across all channels.
    pub queue_depth: usize,
    /// Failed attempts since the last successful connection.
    pub reconnect_attempts: u32,
    /// Last acknowledged heartbeat.
    pub last_heartbeat_at: Option<Instant>,
}

impl ConnectionSnapshot {
    /// Average latency in whole milliseconds.
    pub fn latency_ms(&self) -> Option<u64> {
        self.latency.map(|d| d.as_millis().min(u128::from(u64::MAX)) as u64)
    }
}
