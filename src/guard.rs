//! Panic isolation for user-supplied callbacks.
//!
//! Subscription callbacks, state observers and diagnostic subscribers are all
//! external code. They run through [`guarded`] (sync) or
//! [`futures::FutureExt::catch_unwind`] (async) so that a panic is reported
//! instead of unwinding through the supervisor.
//!
//! `AssertUnwindSafe` is used: a callback that panics while holding its own
//! `Mutex` may leave *its* state inconsistent. Supervisor state is never
//! borrowed across a callback invocation.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Runs `f`, converting a panic into its message.
pub(crate) fn guarded<R>(f: impl FnOnce() -> R) -> Result<R, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|p| panic_message(&*p))
}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
