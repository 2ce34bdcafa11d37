//! # Backoff policy for reconnection attempts.
//!
//! [`BackoffPolicy`] computes how long the reconnection scheduler waits after
//! the `n`-th consecutive failed attempt:
//!
//! ```text
//! delay(n) = min(first × factor^(n-1), max) × jitter     (n >= 1)
//! ```
//!
//! The jittered value is clamped to `max` again, so once the base delay is
//! capped the result stays in `[max × low, max]` for a scaled jitter. Because
//! the base is derived purely from the attempt number, jitter output never
//! feeds back into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use channelvisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(1000),
//!     max: Duration::from_secs(30),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.delay(1), Duration::from_millis(1000));
//! assert_eq!(backoff.delay(5), Duration::from_millis(16_000));
//! assert_eq!(backoff.delay(6), Duration::from_secs(30));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Reconnect backoff policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failed attempt.
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Jitter applied on top of the capped base delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns a strategy with:
    /// - `first = 1s`;
    /// - `max = 30s`;
    /// - `factor = 2.0`;
    /// - `jitter = Scaled[0.75, 1.25]`.
    fn default() -> Self {
        Self {
            first: Duration::from_secs(1),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter: JitterPolicy::reference(),
        }
    }
}

impl BackoffPolicy {
    /// Base delay for `attempt` (1-based) before jitter, clamped to [`BackoffPolicy::max`].
    pub fn base(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let unclamped = self.first.as_secs_f64() * self.factor.powi(exp);

        if !unclamped.is_finite() || unclamped < 0.0 || unclamped > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(unclamped)
        }
    }

    /// Computes the jittered delay for the given attempt number (1-based).
    ///
    /// Attempt `0` is treated as attempt `1`.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.jitter.apply(self.base(attempt)).min(self.max)
    }
}
