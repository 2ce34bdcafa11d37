//! # Fixed-window throttle for inbound channel events.
//!
//! [`ThrottleGate`] admits at most [`ThrottleGate::max_burst`] events per
//! [`ThrottleGate::window`] for one key. Each key owns a [`ThrottleBucket`];
//! the gate itself is plain configuration and holds no state, so buckets can
//! live behind independent per-channel locks.
//!
//! ## Rules
//! - Windows are **fixed**: boundaries are `start + k × window`, aligned to the
//!   bucket's first window, never to the last event.
//! - A bucket is reset exactly once when a boundary is crossed, never partially.
//! - Rejected events are **dropped** (counted), never queued or delayed.
//!
//! ```text
//! t: 0ms ────────── 1000ms ────────── 2000ms
//!    [ admit ≤ max_burst ][ admit ≤ max_burst ]
//! ```

use std::time::Duration;

use tokio::time::Instant;

/// Fixed-window rate limit parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThrottleGate {
    /// Window length (`0` disables throttling).
    pub window: Duration,
    /// Maximum admitted events per window (`0` disables throttling).
    pub max_burst: u32,
}

impl Default for ThrottleGate {
    /// `window = 1s`, `max_burst = 10`.
    fn default() -> Self {
        Self {
            window: Duration::from_secs(1),
            max_burst: 10,
        }
    }
}

/// Per-key throttle state.
#[derive(Debug, Clone)]
pub struct ThrottleBucket {
    count: u32,
    window_reset_at: Instant,
    dropped: u64,
}

impl ThrottleBucket {
    /// Creates a bucket whose first window starts at `now`.
    pub fn new(gate: &ThrottleGate, now: Instant) -> Self {
        Self {
            count: 0,
            window_reset_at: now + gate.window,
            dropped: 0,
        }
    }

    /// Events admitted in the current window.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Instant at which the current window closes.
    pub fn window_reset_at(&self) -> Instant {
        self.window_reset_at
    }

    /// Total events dropped by this bucket.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl ThrottleGate {
    /// Returns `true` if throttling is active (non-zero window and burst).
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.window > Duration::ZERO && self.max_burst > 0
    }

    /// Decides whether one event may pass at `now`.
    ///
    /// Increments the window count on admission, the drop counter otherwise.
    pub fn admit(&self, bucket: &mut ThrottleBucket, now: Instant) -> bool {
        if !self.is_enabled() {
            return true;
        }
        if now >= bucket.window_reset_at {
            let window_ns = self.window.as_nanos();
            let behind_ns = now.duration_since(bucket.window_reset_at).as_nanos();
            let advance_ns = (behind_ns / window_ns + 1).saturating_mul(window_ns);
            let advance = Duration::from_nanos(u64::try_from(advance_ns).unwrap_or(u64::MAX));
            bucket.window_reset_at = bucket
                .window_reset_at
                .checked_add(advance)
                .unwrap_or(now + self.window);
            bucket.count = 0;
        }
        if bucket.count < self.max_burst {
            bucket.count += 1;
            true
        } else {
            bucket.dropped += 1;
            false
        }
    }
}
