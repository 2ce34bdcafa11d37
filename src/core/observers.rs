//! # State observers.
//!
//! Observers receive every [`Transition`] synchronously, in registration
//! order, on the thread that changed the state. Each call is guarded: a
//! panicking observer is reported as
//! [`EventKind::ObserverPanicked`](crate::EventKind::ObserverPanicked) and the
//! remaining observers still run.
//!
//! Observers may call back into the supervisor (read the snapshot, or even
//! `disconnect()`); notification is serialized by a re-entrant lock.
//!
//! ```rust
//! use channelvisor::{Observe, Transition};
//!
//! struct Banner;
//!
//! impl Observe for Banner {
//!     fn on_transition(&self, t: &Transition) {
//!         println!("{} -> {}", t.from, t.to);
//!     }
//!     fn name(&self) -> &'static str { "banner" }
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::events::{Bus, Event, EventKind};
use crate::guard::guarded;

use super::state::Transition;

/// Synchronous state-change observer.
///
/// Implemented for any `Fn(&Transition) + Send + Sync + 'static`.
pub trait Observe: Send + Sync + 'static {
    /// Called once per state change.
    fn on_transition(&self, transition: &Transition);

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

impl<F> Observe for F
where
    F: Fn(&Transition) + Send + Sync + 'static,
{
    fn on_transition(&self, transition: &Transition) {
        self(transition)
    }

    fn name(&self) -> &'static str {
        "closure"
    }
}

/// Handle returned by `Supervisor::add_observer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

pub(crate) struct ObserverSet {
    next_id: AtomicU64,
    entries: RwLock<Vec<(ObserverId, Arc<dyn Observe>)>>,
    bus: Bus,
}

impl ObserverSet {
    pub(crate) fn new(bus: Bus) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: RwLock::new(Vec::new()),
            bus,
        }
    }

    pub(crate) fn add(&self, observer: Arc<dyn Observe>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push((id, observer));
        id
    }

    pub(crate) fn remove(&self, id: ObserverId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(i, _)| *i != id);
        entries.len() != before
    }

    /// Calls every observer in registration order. No lock is held during calls.
    pub(crate) fn notify(&self, transition: &Transition) {
        let entries: Vec<Arc<dyn Observe>> =
            self.entries.read().iter().map(|(_, o)| Arc::clone(o)).collect();
        for obs in entries {
            if let Err(info) = guarded(|| obs.on_transition(transition)) {
                tracing::warn!(observer = obs.name(), panic = %info, "state observer panicked");
                self.bus.publish(
                    Event::new(EventKind::ObserverPanicked)
                        .with_channel(obs.name())
                        .with_reason(info),
                );
            }
        }
    }
}
