//! # Diagnostic event subscribers.
//!
//! Events published on the [`Bus`](crate::Bus) are forwarded by a
//! listener (spawned by the builder) to a [`SubscriberSet`], which fans them
//! out to [`Subscribe`] implementations.
//!
//! ```text
//! Supervisor / Registry ── publish(Event) ──► Bus ──► listener ──► SubscriberSet::emit
//!                                                                   ├──► LogWriter
//!                                                                   └──► custom (metrics, alerts)
//! ```

mod log;
mod set;
mod subscribe;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
