//! # Jitter policy for reconnect delays.
//!
//! [`JitterPolicy`] perturbs backoff delays so that many independent
//! supervisors do not retry in lockstep after a shared outage.
//!
//! - [`JitterPolicy::None`] no randomization, predictable delays
//! - [`JitterPolicy::Full`] random delay in [0, delay]
//! - [`JitterPolicy::Scaled`] delay multiplied by a factor drawn from [low, high]

use rand::Rng;
use std::time::Duration;

/// Policy controlling randomization of reconnect delays.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum JitterPolicy {
    /// No jitter: use the exact backoff delay.
    ///
    /// Use when:
    /// - a single client connects to the backend
    /// - tests need exact timings
    None,

    /// Full jitter: random delay in [0, delay].
    Full,

    /// Multiplicative jitter: `delay × U(low, high)`.
    ///
    /// The reference range is `[0.75, 1.25]`, see [`JitterPolicy::reference`].
    Scaled {
        /// Lower bound of the factor (clamped to `>= 0`).
        low: f64,
        /// Upper bound of the factor.
        high: f64,
    },
}

impl Default for JitterPolicy {
    /// Returns [`JitterPolicy::reference`].
    fn default() -> Self {
        JitterPolicy::reference()
    }
}

impl JitterPolicy {
    /// `Scaled { low: 0.75, high: 1.25 }`.
    pub const fn reference() -> Self {
        JitterPolicy::Scaled {
            low: 0.75,
            high: 1.25,
        }
    }

    /// Applies jitter to the given delay.
    ///
    /// Degenerate ranges (`high <= low`, non-finite bounds) fall back to `low`
    /// without sampling.
    pub fn apply(&self, delay: Duration) -> Duration {
        match *self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => full_jitter(delay),
            JitterPolicy::Scaled { low, high } => scaled_jitter(delay, low, high),
        }
    }
}

/// random[0, delay]
fn full_jitter(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    if ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=ms))
}

/// delay × random[low, high]
fn scaled_jitter(delay: Duration, low: f64, high: f64) -> Duration {
    if !low.is_finite() || !high.is_finite() {
        return delay;
    }
    let low = low.max(0.0);
    let factor = if high <= low {
        low
    } else {
        rand::rng().random_range(low..=high)
    };
    Duration::try_from_secs_f64(delay.as_secs_f64() * factor).unwrap_or(Duration::MAX)
}
