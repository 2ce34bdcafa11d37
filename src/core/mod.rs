//! Runtime core: connection lifecycle and supervision.
//!
//! The only entry point from this module is [`Supervisor`], built through
//! [`SupervisorBuilder`].
//!
//! Internal modules:
//! - [`supervisor`]: state machine, attempts, link tasks, teardown;
//! - [`heartbeat`]: liveness probes and latency window;
//! - [`reconnect`]: single pending reconnection timer;
//! - [`timer`]: cancellable task handles;
//! - [`observers`]: synchronous, guarded state observers;
//! - [`state`]: states, transitions and snapshots;
//! - [`config`]: supervisor settings.

mod builder;
mod config;
mod heartbeat;
mod observers;
mod reconnect;
mod state;
mod supervisor;
mod timer;

pub use builder::SupervisorBuilder;
pub use config::Config;
pub use observers::{ObserverId, Observe};
pub use state::{ConnectionSnapshot, ConnectionState, LatencyTier, Transition};
pub use supervisor::{Delivery, Supervisor};
