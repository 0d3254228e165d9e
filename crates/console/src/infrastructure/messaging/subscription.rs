//! Disposable subscription handle.

use std::fmt;
use std::sync::Mutex;

use crate::infrastructure::lock;

type DisposeFn = Box<dyn FnOnce() + Send + 'static>;

/// Handle returned by every `subscribe` in the core.
///
/// `dispose` removes exactly the registration that produced this handle and
/// is idempotent. Dropping the handle does NOT unsubscribe; call `dispose`
/// explicitly.
pub struct Subscription {
    dispose: Mutex<Option<DisposeFn>>,
}

impl Subscription {
    pub(crate) fn new(dispose: impl FnOnce() + Send + 'static) -> Self {
        Self {
            dispose: Mutex::new(Some(Box::new(dispose))),
        }
    }

    pub fn dispose(&self) {
        // Take first so the callback runs without holding our own lock.
        let dispose = lock(&self.dispose).take();
        if let Some(dispose) = dispose {
            dispose();
        }
    }

    pub fn is_disposed(&self) -> bool {
        lock(&self.dispose).is_none()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn dispose_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let subscription = Subscription::new(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });

        subscription.dispose();
        subscription.dispose();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(subscription.is_disposed());
    }

    #[test]
    fn drop_does_not_dispose() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        drop(Subscription::new(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
