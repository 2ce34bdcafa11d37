//! # Diagnostic subscriber trait
//!
//! `Subscribe` is the extension point for plugging event handlers (logs,
//! metrics, alerting) into the supervisor. Each subscriber is driven by a
//! dedicated worker fed by a bounded queue owned by the
//! [`SubscriberSet`](crate::SubscriberSet).
//!
//! ## Contract
//! - Implementations may be slow; they never block the supervisor or other
//!   subscribers.
//! - Each subscriber declares its queue capacity via
//!   [`Subscribe::queue_capacity`]. On overflow the event is dropped for that
//!   subscriber and `SubscriberOverflow` is published.
//!
//! ## Example
//! ```rust
//! use channelvisor::{Event, EventKind, Subscribe};
//!
//! struct Outages;
//!
//! #[async_trait::async_trait]
//! impl Subscribe for Outages {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::ReconnectExhausted {
//!             // page someone
//!         }
//!     }
//!     fn name(&self) -> &'static str { "outages" }
//!     fn queue_capacity(&self) -> usize { 64 }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Contract for diagnostic event subscribers.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event.
    async fn on_event(&self, event: &Event);

    /// Human-readable name (for logs and overflow events).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred capacity of this subscriber's queue.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
