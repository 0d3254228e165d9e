pub mod clock;
pub mod http_client;
pub mod messaging;
pub mod websocket;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use clock::SystemClock;
pub use http_client::ApiAdapter;
pub use messaging::{ConnectionState, EventBus, Subscription};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a std mutex, recovering the data if a previous holder panicked.
///
/// Every guarded value in the core is replaced wholesale or appended to, so a
/// panic mid-update cannot leave it half-written.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
