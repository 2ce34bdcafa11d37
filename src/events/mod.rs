//! Diagnostic events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Supervisor` (state, backoff, auth), heartbeat task,
//!   reader task, `ChannelRegistry` (throttle, overflow, flush, panics),
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the `SubscriberSet` listener spawned by the builder, and any
//!   receiver obtained from `Supervisor::bus()`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
