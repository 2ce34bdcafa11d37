//! # Diagnostic events emitted by the supervisor and the channel layer.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Connection events**: attempts, state changes, heartbeats, backoff
//! - **Channel events**: throttling, queue overflow, flushes, dropped payloads
//! - **Isolation events**: panics caught in callbacks, observers, subscribers
//!
//! The [`Event`] struct carries optional metadata (channel, reason, attempt,
//! delay, latency). State transitions are additionally delivered synchronously
//! to observers, see [`Observe`](crate::Observe); events are the lossy,
//! asynchronous side channel used for logs and metrics.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use channelvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ReconnectScheduled)
//!     .with_attempt(3)
//!     .with_delay(Duration::from_secs(4))
//!     .with_reason("connection refused");
//!
//! assert_eq!(ev.kind, EventKind::ReconnectScheduled);
//! assert_eq!(ev.delay_ms, Some(4000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::core::ConnectionState;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of diagnostic events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Connection ===
    /// A connection attempt is starting.
    ///
    /// Sets: `attempt` (failed attempts so far + 1)
    ConnectAttempt,

    /// The supervisor changed state.
    ///
    /// Sets: `state` (new state), `reason` (`"{from} -> {to}"` plus cause)
    StateChanged,

    /// The link dropped or reported a transport error.
    ///
    /// Sets: `reason`
    LinkLost,

    /// No heartbeat acknowledgement within the timeout.
    ///
    /// Sets: `timeout_ms`
    HeartbeatTimeout,

    /// Heartbeat acknowledged.
    ///
    /// Sets: `latency_ms`
    HeartbeatAck,

    /// Next reconnection attempt scheduled.
    ///
    /// Sets: `attempt` (failed attempts so far), `delay_ms`, `reason` (last error)
    ReconnectScheduled,

    /// Maximum reconnection attempts exceeded; the supervisor is `Failed`.
    ///
    /// Sets: `attempt`
    ReconnectExhausted,

    /// The backend rejected the credentials.
    ///
    /// Sets: `reason`
    AuthRejected,

    // === Channels ===
    /// An inbound event was dropped by the throttle.
    ///
    /// Sets: `channel`
    EventThrottled,

    /// An inbound frame was malformed and dropped.
    ///
    /// Sets: `channel` (when known), `reason`
    ProtocolDropped,

    /// A buffered message was evicted by a newer one.
    ///
    /// Sets: `channel`, `reason`
    QueueOverflow,

    /// A flush pass finished for one channel.
    ///
    /// Sets: `channel`, `count` (messages sent)
    FlushCompleted,

    /// A flush pass stopped early; the remainder waits for the next connection.
    ///
    /// Sets: `channel`, `reason`
    FlushStopped,

    // === Isolation ===
    /// A subscription callback panicked.
    ///
    /// Sets: `channel`, `reason` (panic message)
    CallbackPanicked,

    /// A state observer panicked.
    ///
    /// Sets: `channel` (observer name), `reason` (panic message)
    ObserverPanicked,

    /// Subscriber panicked during event processing.
    ///
    /// Sets: `channel` (subscriber name), `reason` (panic message)
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `channel` (subscriber name), `reason` (`"full"` or `"closed"`)
    SubscriberOverflow,
}

/// Diagnostic event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Channel (or subscriber/observer) name, if applicable.
    pub channel: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Connection attempt number.
    pub attempt: Option<u32>,
    /// Number of items affected (messages flushed).
    pub count: Option<u32>,
    /// Backoff delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Heartbeat timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Round-trip latency in milliseconds (compact).
    pub latency_ms: Option<u32>,
    /// New connection state for `StateChanged`.
    pub state: Option<ConnectionState>,
}

#[inline]
fn compact_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            channel: None,
            reason: None,
            attempt: None,
            count: None,
            delay_ms: None,
            timeout_ms: None,
            latency_ms: None,
            state: None,
        }
    }

    /// Attaches a channel name.
    #[inline]
    pub fn with_channel(mut self, channel: impl Into<Arc<str>>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches an item count, saturating at `u32::MAX`.
    #[inline]
    pub fn with_count(mut self, n: usize) -> Self {
        self.count = Some(u32::try_from(n).unwrap_or(u32::MAX));
        self
    }

    /// Attaches a backoff delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a heartbeat timeout (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a latency sample (stored as milliseconds).
    #[inline]
    pub fn with_latency(mut self, d: Duration) -> Self {
        self.latency_ms = Some(compact_ms(d));
        self
    }

    /// Attaches the new connection state.
    #[inline]
    pub fn with_state(mut self, state: ConnectionState) -> Self {
        self.state = Some(state);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_channel(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_channel(subscriber)
            .with_reason(info)
    }
}
