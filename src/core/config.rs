//! # Supervisor configuration.
//!
//! Provides [`Config`], the settings handed to `Supervisor::builder`.
//!
//! ## Sentinel values
//! - `heartbeat_interval = 0s` → heartbeats disabled (no liveness detection)
//! - `max_reconnect_attempts = 0` → retry forever
//! - `throttle.window = 0s` or `throttle.max_burst = 0` → throttling disabled
//! - `heartbeat_timeout` shorter than `1.5 × heartbeat_interval` → raised to that floor

use std::time::Duration;

use crate::policies::{BackoffPolicy, ThrottleGate};

/// Configuration for one supervisor.
///
/// ## Field semantics
/// - `heartbeat_interval`: probe period while Connected (`0s` = disabled)
/// - `heartbeat_timeout`: silence after which the link is presumed dead
/// - `latency_window`: number of round-trip samples averaged (min 1)
/// - `backoff`: reconnection delay curve and jitter
/// - `max_reconnect_attempts`: failed attempts tolerated before `Failed` (`0` = unlimited)
/// - `queue_capacity`: per-channel outbound buffer size (min 1)
/// - `throttle`: inbound admission window and burst
/// - `bus_capacity`: diagnostic event ring buffer (min 1)
///
/// ## Notes
/// All fields are public. Prefer the helper accessors over sentinel checks.
#[derive(Clone, Debug)]
pub struct Config {
    /// Heartbeat probe interval.
    pub heartbeat_interval: Duration,

    /// Maximum time without an acknowledgement before the link is declared dead.
    ///
    /// Read through [`Config::heartbeat_timeout_clamped`], which keeps it at
    /// least 1.5 × `heartbeat_interval`.
    pub heartbeat_timeout: Duration,

    /// Size of the rolling latency window (K).
    pub latency_window: usize,

    /// Reconnection backoff.
    pub backoff: BackoffPolicy,

    /// Failed attempts tolerated before giving up.
    ///
    /// - `0` = unlimited
    /// - `n > 0` = the `n+1`-th consecutive failure moves the supervisor to `Failed`
    pub max_reconnect_attempts: u32,

    /// Per-channel outbound queue capacity.
    pub queue_capacity: usize,

    /// Inbound throttle applied per channel.
    pub throttle: ThrottleGate,

    /// Capacity of the diagnostic event bus.
    ///
    /// Slow receivers that lag more than `bus_capacity` events skip older items.
    pub bus_capacity: usize,
}

impl Config {
    /// Heartbeat interval as an `Option` (`None` = disabled).
    #[inline]
    pub fn heartbeat(&self) -> Option<Duration> {
        if self.heartbeat_interval.is_zero() {
            None
        } else {
            Some(self.heartbeat_interval)
        }
    }

    /// Heartbeat timeout, raised to at least 1.5 × the interval so a probe
    /// always has time to be answered.
    #[inline]
    pub fn heartbeat_timeout_clamped(&self) -> Duration {
        let floor = self.heartbeat_interval.saturating_add(self.heartbeat_interval / 2);
        self.heartbeat_timeout.max(floor)
    }

    /// Attempt cap as an `Option` (`None` = unlimited).
    #[inline]
    pub fn attempt_limit(&self) -> Option<u32> {
        match self.max_reconnect_attempts {
            0 => None,
            n => Some(n),
        }
    }

    /// Latency window clamped to a minimum of 1.
    #[inline]
    pub fn latency_window_clamped(&self) -> usize {
        self.latency_window.max(1)
    }

    /// Queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn queue_capacity_clamped(&self) -> usize {
        self.queue_capacity.max(1)
    }

    /// Bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Reference configuration:
    ///
    /// - heartbeat every `30s`, timeout `45s`, latency window `5`
    /// - backoff `1s` doubling to `30s`, jitter `[0.75, 1.25]`
    /// - `10` reconnect attempts
    /// - `100` queued messages per channel
    /// - throttle `10` events per `1s` window
    /// - bus `1024`
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(45),
            latency_window: 5,
            backoff: BackoffPolicy::default(),
            max_reconnect_attempts: 10,
            queue_capacity: 100,
            throttle: ThrottleGate::default(),
            bus_capacity: 1024,
        }
    }
}
