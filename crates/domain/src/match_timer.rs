//! Match timer state machine.
//!
//! ```text
//!            start                      tick -> 0
//!   Idle ------------> Running ---------------------> Expired
//!    ^  <------------    |                               |
//!    |      stop         |                               |
//!    +------ reset ------+------------- reset -----------+
//! ```
//!
//! The machine is deliberately clock-free: callers feed it either locally
//! measured elapsed time (`advance`) or the remaining time reported by the
//! backend (`tick`). Remaining time never increases while running and never
//! goes below zero. Expiry is reported exactly once per run so the caller can
//! raise the emergency-stop interlock without guarding against repeats.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default match length: two minutes.
pub const DEFAULT_MATCH_DURATION_MS: u64 = 120_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerPhase {
    Idle,
    Running,
    Expired,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    #[error("match timer is already running")]
    AlreadyRunning,
    #[error("match timer is not running")]
    NotRunning,
    #[error("match timer has expired; reset it before starting again")]
    Expired,
    #[error("match duration cannot change while the timer is running")]
    DurationLockedWhileRunning,
    #[error("emergency stop is active; release it before starting the match")]
    EmergencyStopActive,
    #[error("invalid match duration: {0} ms")]
    InvalidDuration(u64),
}

/// Result of feeding a remaining-time observation into the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Not running, or the observation would not decrease remaining time
    Ignored,
    Updated { remaining_ms: u64 },
    /// Remaining time reached zero on this tick. Returned once per run.
    Expired,
}

/// Read-only view of the timer, cheap to copy out to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchTimerState {
    pub phase: TimerPhase,
    pub duration_ms: u64,
    pub remaining_ms: u64,
    pub emergency_stop_active: bool,
}

impl MatchTimerState {
    pub fn running(&self) -> bool {
        self.phase == TimerPhase::Running
    }

    pub fn remaining_seconds(&self) -> u64 {
        self.remaining_ms / 1000
    }
}

#[derive(Debug, Clone)]
pub struct MatchTimer {
    phase: TimerPhase,
    duration_ms: u64,
    remaining_ms: u64,
    emergency_stop_active: bool,
    transitions: u64,
}

impl Default for MatchTimer {
    fn default() -> Self {
        Self {
            phase: TimerPhase::Idle,
            duration_ms: DEFAULT_MATCH_DURATION_MS,
            remaining_ms: DEFAULT_MATCH_DURATION_MS,
            emergency_stop_active: false,
            transitions: 0,
        }
    }
}

impl MatchTimer {
    pub fn new(duration_ms: u64) -> Result<Self, TimerError> {
        if duration_ms == 0 {
            return Err(TimerError::InvalidDuration(duration_ms));
        }
        Ok(Self {
            duration_ms,
            remaining_ms: duration_ms,
            ..Self::default()
        })
    }

    pub fn state(&self) -> MatchTimerState {
        MatchTimerState {
            phase: self.phase,
            duration_ms: self.duration_ms,
            remaining_ms: self.remaining_ms,
            emergency_stop_active: self.emergency_stop_active,
        }
    }

    pub fn phase(&self) -> TimerPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == TimerPhase::Running
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn remaining_ms(&self) -> u64 {
        self.remaining_ms
    }

    pub fn emergency_stop_active(&self) -> bool {
        self.emergency_stop_active
    }

    /// Check whether `start` would be accepted, without changing anything.
    pub fn can_start(&self) -> Result<(), TimerError> {
        match self.phase {
            TimerPhase::Running => Err(TimerError::AlreadyRunning),
            TimerPhase::Expired => Err(TimerError::Expired),
            TimerPhase::Idle if self.emergency_stop_active => {
                Err(TimerError::EmergencyStopActive)
            }
            TimerPhase::Idle => Ok(()),
        }
    }

    /// Idle -> Running.
    pub fn start(&mut self) -> Result<(), TimerError> {
        self.can_start()?;
        self.phase = TimerPhase::Running;
        self.transitions += 1;
        Ok(())
    }

    /// Running -> Idle. Remaining time is kept (pause, not reset).
    pub fn stop(&mut self) -> Result<(), TimerError> {
        if self.phase != TimerPhase::Running {
            return Err(TimerError::NotRunning);
        }
        self.phase = TimerPhase::Idle;
        self.transitions += 1;
        Ok(())
    }

    /// Any state -> Idle with the full configured duration.
    pub fn reset(&mut self) {
        self.phase = TimerPhase::Idle;
        self.remaining_ms = self.duration_ms;
        self.transitions += 1;
    }

    /// Check whether `set_duration` would be accepted.
    pub fn can_set_duration(&self, duration_ms: u64) -> Result<(), TimerError> {
        if self.phase == TimerPhase::Running {
            return Err(TimerError::DurationLockedWhileRunning);
        }
        if duration_ms == 0 {
            return Err(TimerError::InvalidDuration(duration_ms));
        }
        Ok(())
    }

    /// Configure a new duration and resync remaining time to it.
    pub fn set_duration(&mut self, duration_ms: u64) -> Result<(), TimerError> {
        self.can_set_duration(duration_ms)?;
        self.duration_ms = duration_ms;
        self.remaining_ms = duration_ms;
        self.phase = TimerPhase::Idle;
        self.transitions += 1;
        Ok(())
    }

    /// Feed an observed remaining time.
    pub fn tick(&mut self, remaining_ms: u64) -> TickOutcome {
        if self.phase != TimerPhase::Running {
            return TickOutcome::Ignored;
        }

        let next = remaining_ms.min(self.remaining_ms);
        if next == 0 {
            self.remaining_ms = 0;
            self.phase = TimerPhase::Expired;
            self.transitions += 1;
            return TickOutcome::Expired;
        }
        if next == self.remaining_ms {
            return TickOutcome::Ignored;
        }

        self.remaining_ms = next;
        TickOutcome::Updated { remaining_ms: next }
    }

    /// Feed locally measured elapsed time.
    pub fn advance(&mut self, elapsed: Duration) -> TickOutcome {
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self.tick(self.remaining_ms.saturating_sub(elapsed_ms))
    }

    /// Force expiry (the backend declared the match over).
    pub fn expire(&mut self) -> TickOutcome {
        self.tick(0)
    }

    /// Enter Running because the backend says the match is running. Unlike
    /// `start` this bypasses the emergency-stop gate: the backend owns the
    /// match and the local machine only mirrors it.
    pub fn adopt_running(&mut self, remaining_ms: u64) -> TickOutcome {
        match self.phase {
            TimerPhase::Running => return self.tick(remaining_ms),
            TimerPhase::Expired if remaining_ms == 0 => return TickOutcome::Ignored,
            _ => {}
        }

        let remaining = remaining_ms.min(self.duration_ms);
        self.transitions += 1;
        if remaining == 0 {
            self.remaining_ms = 0;
            self.phase = TimerPhase::Expired;
            return TickOutcome::Expired;
        }
        self.remaining_ms = remaining;
        self.phase = TimerPhase::Running;
        TickOutcome::Updated {
            remaining_ms: remaining,
        }
    }

    pub fn set_emergency_stop(&mut self, active: bool) {
        self.emergency_stop_active = active;
    }

    /// Adopt the backend's timer state, but only before any local transition
    /// has happened. Returns whether the snapshot was applied.
    pub fn seed(&mut self, running: bool, remaining_ms: u64, duration_ms: u64) -> bool {
        if self.transitions > 0 || duration_ms == 0 {
            return false;
        }
        self.duration_ms = duration_ms;
        self.remaining_ms = remaining_ms.min(duration_ms);
        self.phase = match (running, self.remaining_ms) {
            (true, 0) => TimerPhase::Expired,
            (true, _) => TimerPhase::Running,
            (false, _) => TimerPhase::Idle,
        };
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timer(seconds: u64) -> MatchTimer {
        MatchTimer::new(seconds * 1000).expect("valid duration")
    }

    #[test]
    fn full_match_expires_once_after_last_tick() {
        let mut t = timer(120);
        t.start().expect("start");

        let mut expirations = 0;
        for second in 1..=120u64 {
            if t.tick((120 - second) * 1000) == TickOutcome::Expired {
                expirations += 1;
            }
        }
        // Late duplicate zero ticks from the backend
        for _ in 0..5 {
            if t.tick(0) == TickOutcome::Expired {
                expirations += 1;
            }
        }

        assert_eq!(expirations, 1);
        assert_eq!(t.remaining_ms(), 0);
        assert!(!t.is_running());
        assert_eq!(t.phase(), TimerPhase::Expired);
    }

    #[test]
    fn start_is_rejected_while_running() {
        let mut t = timer(60);
        t.start().expect("start");
        assert_eq!(t.start(), Err(TimerError::AlreadyRunning));
    }

    #[test]
    fn stop_pauses_without_resetting() {
        let mut t = timer(60);
        t.start().expect("start");
        t.tick(45_000);
        t.stop().expect("stop");

        assert_eq!(t.phase(), TimerPhase::Idle);
        assert_eq!(t.remaining_ms(), 45_000);
        // frozen while stopped
        assert_eq!(t.tick(10_000), TickOutcome::Ignored);
        assert_eq!(t.remaining_ms(), 45_000);
    }

    #[test]
    fn remaining_never_increases_while_running() {
        let mut t = timer(60);
        t.start().expect("start");
        assert_eq!(t.tick(50_000), TickOutcome::Updated { remaining_ms: 50_000 });
        assert_eq!(t.tick(55_000), TickOutcome::Ignored);
        assert_eq!(t.remaining_ms(), 50_000);
    }

    #[test]
    fn reset_restores_configured_duration_from_any_phase() {
        let mut t = timer(10);
        t.start().expect("start");
        t.expire();
        t.reset();

        let state = t.state();
        assert_eq!(state.phase, TimerPhase::Idle);
        assert_eq!(state.remaining_ms, 10_000);
        assert!(!state.running());
    }

    #[test]
    fn set_duration_while_running_leaves_duration_unchanged() {
        let mut t = timer(120);
        t.start().expect("start");

        assert_eq!(
            t.set_duration(90_000),
            Err(TimerError::DurationLockedWhileRunning)
        );
        assert_eq!(t.duration_ms(), 120_000);
    }

    #[test]
    fn set_duration_resyncs_remaining() {
        let mut t = timer(120);
        t.set_duration(90_000).expect("idle timer accepts duration");
        assert_eq!(t.remaining_ms(), 90_000);
        assert_eq!(t.set_duration(0), Err(TimerError::InvalidDuration(0)));
    }

    #[test]
    fn emergency_stop_gates_start() {
        let mut t = timer(30);
        t.set_emergency_stop(true);
        assert_eq!(t.start(), Err(TimerError::EmergencyStopActive));

        t.set_emergency_stop(false);
        assert!(t.start().is_ok());
    }

    #[test]
    fn expired_timer_must_be_reset_before_start() {
        let mut t = timer(1);
        t.start().expect("start");
        assert_eq!(t.advance(Duration::from_secs(5)), TickOutcome::Expired);
        assert_eq!(t.start(), Err(TimerError::Expired));
    }

    #[test]
    fn seed_applies_only_before_first_transition() {
        let mut t = MatchTimer::default();
        assert!(t.seed(true, 30_000, 60_000));
        assert_eq!(t.phase(), TimerPhase::Running);
        assert_eq!(t.remaining_ms(), 30_000);

        t.stop().expect("stop");
        assert!(!t.seed(false, 60_000, 60_000));
        assert_eq!(t.remaining_ms(), 30_000);
    }

    #[test]
    fn adopt_running_bypasses_interlock_and_clamps_to_duration() {
        let mut t = timer(60);
        t.set_emergency_stop(true);

        assert_eq!(
            t.adopt_running(90_000),
            TickOutcome::Updated { remaining_ms: 60_000 }
        );
        assert!(t.is_running());
        assert_eq!(t.adopt_running(58_000), TickOutcome::Updated { remaining_ms: 58_000 });
    }

    #[test]
    fn adopt_running_with_zero_does_not_expire_twice() {
        let mut t = timer(5);
        t.start().expect("start");
        assert_eq!(t.expire(), TickOutcome::Expired);
        assert_eq!(t.adopt_running(0), TickOutcome::Ignored);
        assert_eq!(t.phase(), TimerPhase::Expired);
    }
}
