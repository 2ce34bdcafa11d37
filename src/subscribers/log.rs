//! # LogWriter: renders diagnostic events through `tracing`.
//!
//! Connection trouble is logged at `warn`, routine lifecycle at `info`, and
//! per-message noise (throttling, flushes, acks) at `debug`.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO  channelvisor: state changed state=connected reason="connecting -> connected"
//! WARN  channelvisor: link lost reason="heartbeat timeout"
//! INFO  channelvisor: reconnect scheduled attempt=1 delay_ms=1000 reason="..."
//! DEBUG channelvisor: event throttled channel="orders:store-42"
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let channel = e.channel.as_deref().unwrap_or("");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::ConnectAttempt => {
                tracing::debug!(target: "channelvisor", attempt = e.attempt, "connect attempt");
            }
            EventKind::StateChanged => {
                let state = e.state.map(|s| s.as_str()).unwrap_or("unknown");
                tracing::info!(target: "channelvisor", state, reason, "state changed");
            }
            EventKind::LinkLost => {
                tracing::warn!(target: "channelvisor", reason, "link lost");
            }
            EventKind::HeartbeatTimeout => {
                tracing::warn!(target: "channelvisor", timeout_ms = e.timeout_ms, "heartbeat timed out");
            }
            EventKind::HeartbeatAck => {
                tracing::debug!(target: "channelvisor", latency_ms = e.latency_ms, "heartbeat ack");
            }
            EventKind::ReconnectScheduled => {
                tracing::info!(
                    target: "channelvisor",
                    attempt = e.attempt,
                    delay_ms = e.delay_ms,
                    reason,
                    "reconnect scheduled"
                );
            }
            EventKind::ReconnectExhausted => {
                tracing::warn!(target: "channelvisor", attempt = e.attempt, "reconnect attempts exhausted");
            }
            EventKind::AuthRejected => {
                tracing::warn!(target: "channelvisor", reason, "authentication rejected");
            }
            EventKind::EventThrottled => {
                tracing::debug!(target: "channelvisor", channel, "event throttled");
            }
            EventKind::ProtocolDropped => {
                tracing::warn!(target: "channelvisor", channel, reason, "malformed message dropped");
            }
            EventKind::QueueOverflow => {
                tracing::debug!(target: "channelvisor", channel, reason, "queued message evicted");
            }
            EventKind::FlushCompleted => {
                tracing::debug!(target: "channelvisor", channel, sent = e.count, "flush completed");
            }
            EventKind::FlushStopped => {
                tracing::debug!(target: "channelvisor", channel, reason, "flush stopped");
            }
            EventKind::CallbackPanicked => {
                tracing::warn!(target: "channelvisor", channel, panic = reason, "subscription callback panicked");
            }
            EventKind::ObserverPanicked => {
                tracing::warn!(target: "channelvisor", observer = channel, panic = reason, "observer panicked");
            }
            EventKind::SubscriberPanicked => {
                tracing::warn!(target: "channelvisor", subscriber = channel, panic = reason, "subscriber panicked");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(target: "channelvisor", subscriber = channel, reason, "subscriber dropped event");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
