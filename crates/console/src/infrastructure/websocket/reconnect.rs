//! Fixed-delay reconnect policy.
//!
//! Runtime-free so the scheduling rules can be tested without sockets or
//! timers: at most one reconnect timer is outstanding, the delay never grows,
//! and attempts are never capped.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    delay: Duration,
    pending: bool,
    scheduled: u64,
}

impl ReconnectPolicy {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: false,
            scheduled: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Record a channel closure or failed attempt.
    ///
    /// Returns the delay to wait before the next attempt, or `None` when a
    /// reconnect timer is already outstanding (the closure is absorbed by it).
    pub fn schedule(&mut self) -> Option<Duration> {
        if self.pending {
            return None;
        }
        self.pending = true;
        self.scheduled += 1;
        Some(self.delay)
    }

    /// The outstanding timer elapsed; the attempt is being made now.
    pub fn fire(&mut self) {
        self.pending = false;
    }

    /// Drop the outstanding timer without attempting (transport stopped).
    pub fn cancel(&mut self) {
        self.pending = false;
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Total reconnect attempts scheduled so far.
    pub fn attempts_scheduled(&self) -> u64 {
        self.scheduled
    }
}
