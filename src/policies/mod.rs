//! Retry and rate policies.
//!
//! This module groups the knobs that control **how long** to wait between
//! reconnection attempts and **how many** inbound events a channel admits.
//!
//! ## Contents
//! - [`BackoffPolicy`] how reconnect delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to avoid synchronized retry storms
//! - [`ThrottleGate`]  fixed-window burst limit for inbound events
//!
//! ## Quick wiring
//! ```text
//! Config { backoff: BackoffPolicy, throttle: ThrottleGate, .. }
//!      ├─► core::reconnect::ReconnectScheduler uses backoff.delay(attempt)
//!      └─► channels::Channel holds a ThrottleBucket checked by throttle.admit()
//! ```
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → first=1s, factor=2.0, max=30s, jitter=Scaled[0.75, 1.25].
//! - `ThrottleGate::default()` → window=1s, max_burst=10.

mod backoff;
mod jitter;
mod throttle;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use throttle::{ThrottleBucket, ThrottleGate};
