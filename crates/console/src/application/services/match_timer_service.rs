//! Match timer service - mirrors the match timer and applies push events to it.
//!
//! In [`TimerMode::Authoritative`] the backend owns the match: operator intents
//! are only guarded here and sent through the gateway, and the local machine
//! changes exclusively in response to `match_*` / `timer_update` events. In
//! [`TimerMode::Local`] the console counts down on its own and the backend is
//! never asked to start, stop or reset anything.
//!
//! Either way, reaching zero while running yields [`TickOutcome::Expired`]
//! exactly once; the caller turns that into the emergency-stop request.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use robodeck_domain::{
    DomainError, MatchTimer, MatchTimerState, TickOutcome, TimerError, TimerPhase,
};
use robodeck_shared::{
    event_types, DurationChangedData, EmergencyStopData, MatchStartData, MatchTimerSnapshot,
    ProtocolError, ServerEvent, TimerUpdateData,
};

use crate::infrastructure::lock;
use crate::infrastructure::messaging::{Listeners, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerMode {
    /// Backend push events drive the timer
    #[default]
    Authoritative,
    /// The console runs its own countdown
    Local,
}

impl TimerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerMode::Authoritative => "authoritative",
            TimerMode::Local => "local",
        }
    }
}

impl fmt::Display for TimerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimerMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "authoritative" | "backend" => Ok(TimerMode::Authoritative),
            "local" => Ok(TimerMode::Local),
            other => Err(DomainError::parse(format!("Unknown timer mode: {}", other))),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimerEventError {
    #[error(transparent)]
    Payload(#[from] ProtocolError),
    #[error(transparent)]
    Transition(#[from] TimerError),
}

#[derive(Clone)]
pub struct MatchTimerService {
    timer: Arc<Mutex<MatchTimer>>,
    mode: TimerMode,
    listeners: Listeners<MatchTimerState>,
}

impl MatchTimerService {
    pub fn new(mode: TimerMode, duration_ms: u64) -> Result<Self, TimerError> {
        Ok(Self {
            timer: Arc::new(Mutex::new(MatchTimer::new(duration_ms)?)),
            mode,
            listeners: Listeners::new(),
        })
    }

    pub fn mode(&self) -> TimerMode {
        self.mode
    }

    pub fn state(&self) -> MatchTimerState {
        lock(&self.timer).state()
    }

    /// Receive the timer state after every change.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(MatchTimerState) + Send + Sync + 'static,
    {
        self.listeners.add(Arc::new(listener))
    }

    /// Push event types this service must be subscribed to.
    pub fn event_types(&self) -> Vec<&'static str> {
        match self.mode {
            TimerMode::Authoritative => {
                let mut types = event_types::MATCH_TIMER_EVENTS.to_vec();
                types.push(event_types::EMERGENCY_STOP);
                types
            }
            // Still mirror the interlock so local starts are gated
            TimerMode::Local => vec![event_types::EMERGENCY_STOP],
        }
    }

    /// Run `f` against the machine and notify listeners if the state moved.
    fn update<R>(&self, f: impl FnOnce(&mut MatchTimer) -> R) -> R {
        let (result, before, after) = {
            let mut timer = lock(&self.timer);
            let before = timer.state();
            let result = f(&mut timer);
            (result, before, timer.state())
        };
        if before != after {
            if before.phase != after.phase {
                tracing::info!(
                    from = ?before.phase,
                    to = ?after.phase,
                    remaining_ms = after.remaining_ms,
                    "Match timer transition"
                );
            }
            self.listeners.notify(after);
        }
        result
    }

    /// Apply one push event. Unrelated event types are ignored.
    pub fn apply_event(&self, event: &ServerEvent) -> Result<TickOutcome, TimerEventError> {
        if event.is(event_types::EMERGENCY_STOP) {
            let data: EmergencyStopData = event.decode()?;
            self.update(|t| t.set_emergency_stop(data.active));
            return Ok(TickOutcome::Ignored);
        }
        if self.mode == TimerMode::Local {
            return Ok(TickOutcome::Ignored);
        }

        match event.event_type.as_str() {
            event_types::MATCH_START => {
                // Payload is optional on older backends
                let data: MatchStartData = if event.data.is_null() {
                    MatchStartData::default()
                } else {
                    event.decode()?
                };
                Ok(self.update(|t| -> Result<TickOutcome, TimerError> {
                    if t.is_running() {
                        return Ok(TickOutcome::Ignored);
                    }
                    if t.phase() == TimerPhase::Expired {
                        t.reset();
                    }
                    // A start carrying its duration is a fresh run from the
                    // full duration; without one, resume where the mirror is.
                    let remaining = match data.duration_ms {
                        Some(duration_ms) => {
                            if duration_ms != t.duration_ms() {
                                t.set_duration(duration_ms)?;
                            }
                            duration_ms
                        }
                        None => t.remaining_ms(),
                    };
                    Ok(t.adopt_running(remaining))
                })?)
            }
            event_types::MATCH_STOP => {
                self.update(|t| if t.is_running() { t.stop() } else { Ok(()) })?;
                Ok(TickOutcome::Ignored)
            }
            event_types::MATCH_RESET => {
                self.update(MatchTimer::reset);
                Ok(TickOutcome::Ignored)
            }
            event_types::MATCH_END => Ok(self.update(MatchTimer::expire)),
            event_types::MATCH_DURATION_CHANGED => {
                let data: DurationChangedData = event.decode()?;
                self.update(|t| t.set_duration(data.duration_ms))?;
                Ok(TickOutcome::Ignored)
            }
            event_types::TIMER_UPDATE => {
                let data: TimerUpdateData = event.decode()?;
                let remaining = data.remaining_ms();
                Ok(self.update(|t| match (data.running, t.is_running()) {
                    (true, false) => t.adopt_running(remaining),
                    (true, true) => t.tick(remaining),
                    (false, true) if remaining == 0 => t.expire(),
                    (false, true) => {
                        t.tick(remaining);
                        // is_running was checked above
                        let _ = t.stop();
                        TickOutcome::Ignored
                    }
                    (false, false) => TickOutcome::Ignored,
                }))
            }
            _ => Ok(TickOutcome::Ignored),
        }
    }

    /// Local check before asking the backend to start the match.
    pub fn guard_start(&self) -> Result<(), TimerError> {
        lock(&self.timer).can_start()
    }

    /// Local check before asking the backend to change the duration.
    pub fn guard_set_duration(&self, duration_ms: u64) -> Result<(), TimerError> {
        lock(&self.timer).can_set_duration(duration_ms)
    }

    pub fn start(&self) -> Result<(), TimerError> {
        self.update(MatchTimer::start)
    }

    pub fn stop(&self) -> Result<(), TimerError> {
        self.update(MatchTimer::stop)
    }

    pub fn reset(&self) {
        self.update(MatchTimer::reset)
    }

    pub fn set_duration(&self, duration_ms: u64) -> Result<(), TimerError> {
        self.update(|t| t.set_duration(duration_ms))
    }

    /// Feed locally measured elapsed time (local countdown).
    pub fn advance(&self, elapsed: Duration) -> TickOutcome {
        self.update(|t| t.advance(elapsed))
    }

    /// Adopt the backend's timer at startup. Ignored once anything happened.
    pub fn seed(&self, snapshot: &MatchTimerSnapshot) -> bool {
        let applied = self.update(|t| {
            t.seed(
                snapshot.running,
                snapshot.time_remaining_ms,
                snapshot.duration_ms,
            )
        });
        if applied {
            tracing::debug!(
                running = snapshot.running,
                remaining_ms = snapshot.time_remaining_ms,
                "Seeded match timer from backend"
            );
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service(mode: TimerMode) -> MatchTimerService {
        MatchTimerService::new(mode, 120_000).expect("valid duration")
    }

    fn event(event_type: &str, data: serde_json::Value) -> ServerEvent {
        ServerEvent::new(event_type, data)
    }

    fn update(seconds: u64, running: bool) -> ServerEvent {
        event(
            event_types::TIMER_UPDATE,
            json!({"timeRemainingSeconds": seconds, "running": running}),
        )
    }

    #[test]
    fn parses_mode_names() {
        assert_eq!("local".parse::<TimerMode>().ok(), Some(TimerMode::Local));
        assert_eq!(
            " Authoritative ".parse::<TimerMode>().ok(),
            Some(TimerMode::Authoritative)
        );
        assert!("offline".parse::<TimerMode>().is_err());
        assert_eq!(TimerMode::Local.to_string(), "local");
    }

    #[test]
    fn backend_events_drive_a_full_match() {
        let timer = service(TimerMode::Authoritative);
        timer
            .apply_event(&event(event_types::MATCH_START, json!({})))
            .expect("start");
        assert!(timer.state().running());

        let mut expirations = 0;
        for remaining in (0..120).rev() {
            if timer.apply_event(&update(remaining, true)) == Ok(TickOutcome::Expired) {
                expirations += 1;
            }
        }
        for _ in 0..3 {
            if timer.apply_event(&update(0, false)) == Ok(TickOutcome::Expired) {
                expirations += 1;
            }
        }
        if timer.apply_event(&event(event_types::MATCH_END, json!({}))) == Ok(TickOutcome::Expired)
        {
            expirations += 1;
        }

        assert_eq!(expirations, 1);
        let state = timer.state();
        assert_eq!(state.phase, TimerPhase::Expired);
        assert_eq!(state.remaining_ms, 0);
    }

    #[test]
    fn restart_with_duration_begins_from_full_time() {
        let timer = service(TimerMode::Authoritative);
        let start = event(event_types::MATCH_START, json!({"durationMs": 120_000}));
        timer.apply_event(&start).expect("start");
        timer.apply_event(&update(90, true)).expect("update");
        timer
            .apply_event(&event(event_types::MATCH_STOP, json!({})))
            .expect("stop");
        assert_eq!(timer.state().remaining_ms, 90_000);

        timer.apply_event(&start).expect("restart");
        assert_eq!(timer.state().remaining_ms, 120_000);

        // The backend count is followed immediately, not held at 90s
        timer.apply_event(&update(119, true)).expect("update");
        assert_eq!(timer.state().remaining_ms, 119_000);
    }

    #[test]
    fn start_without_duration_resumes_paused_time() {
        let timer = service(TimerMode::Authoritative);
        timer
            .apply_event(&event(event_types::MATCH_START, json!(null)))
            .expect("start");
        timer.apply_event(&update(75, true)).expect("update");
        timer
            .apply_event(&event(event_types::MATCH_STOP, json!({})))
            .expect("stop");

        timer
            .apply_event(&event(event_types::MATCH_START, json!(null)))
            .expect("resume");
        assert!(timer.state().running());
        assert_eq!(timer.state().remaining_ms, 75_000);
    }

    #[test]
    fn timer_update_adopts_a_running_match() {
        let timer = service(TimerMode::Authoritative);
        timer.apply_event(&update(90, true)).expect("update");

        let state = timer.state();
        assert!(state.running());
        assert_eq!(state.remaining_ms, 90_000);

        // Stale, larger value does not rewind
        timer.apply_event(&update(100, true)).expect("update");
        assert_eq!(timer.state().remaining_ms, 90_000);
    }

    #[test]
    fn timer_update_not_running_pauses() {
        let timer = service(TimerMode::Authoritative);
        timer.apply_event(&update(60, true)).expect("update");
        timer.apply_event(&update(55, false)).expect("update");

        let state = timer.state();
        assert_eq!(state.phase, TimerPhase::Idle);
        assert_eq!(state.remaining_ms, 55_000);
    }

    #[test]
    fn stop_and_reset_events() {
        let timer = service(TimerMode::Authoritative);
        timer.apply_event(&update(30, true)).expect("update");
        timer
            .apply_event(&event(event_types::MATCH_STOP, json!(null)))
            .expect("stop");
        assert_eq!(timer.state().remaining_ms, 30_000);
        assert!(!timer.state().running());

        timer
            .apply_event(&event(event_types::MATCH_RESET, json!(null)))
            .expect("reset");
        assert_eq!(timer.state().remaining_ms, 120_000);
    }

    #[test]
    fn duration_change_while_running_is_rejected() {
        let timer = service(TimerMode::Authoritative);
        timer.apply_event(&update(30, true)).expect("update");

        let result = timer.apply_event(&event(
            event_types::MATCH_DURATION_CHANGED,
            json!({"durationMs": 90_000}),
        ));
        assert_eq!(
            result,
            Err(TimerEventError::Transition(TimerError::DurationLockedWhileRunning))
        );
        assert_eq!(timer.state().duration_ms, 120_000);
        assert_eq!(
            timer.guard_set_duration(90_000),
            Err(TimerError::DurationLockedWhileRunning)
        );
    }

    #[test]
    fn emergency_stop_gates_local_start() {
        let timer = service(TimerMode::Local);
        timer
            .apply_event(&event(event_types::EMERGENCY_STOP, json!({"active": true})))
            .expect("estop");
        assert_eq!(timer.start(), Err(TimerError::EmergencyStopActive));
        assert_eq!(timer.guard_start(), Err(TimerError::EmergencyStopActive));

        timer
            .apply_event(&event(event_types::EMERGENCY_STOP, json!({"active": false})))
            .expect("estop");
        assert_eq!(timer.start(), Ok(()));
    }

    #[test]
    fn local_mode_ignores_backend_timer_events() {
        let timer = service(TimerMode::Local);
        assert_eq!(timer.event_types(), vec![event_types::EMERGENCY_STOP]);
        timer.apply_event(&update(10, true)).expect("ignored");
        assert!(!timer.state().running());
    }

    #[test]
    fn bad_payload_is_reported() {
        let timer = service(TimerMode::Authoritative);
        let result = timer.apply_event(&event(event_types::TIMER_UPDATE, json!({"nope": 1})));
        assert!(matches!(result, Err(TimerEventError::Payload(_))));
    }

    #[test]
    fn seed_only_before_first_transition() {
        let timer = service(TimerMode::Authoritative);
        let snapshot = MatchTimerSnapshot {
            running: false,
            time_remaining_ms: 45_000,
            duration_ms: 60_000,
            time_remaining_seconds: 45,
        };
        assert!(timer.seed(&snapshot));
        assert_eq!(timer.state().remaining_ms, 45_000);

        timer.reset();
        assert!(!timer.seed(&snapshot));
        assert_eq!(timer.state().remaining_ms, 60_000);
    }

    #[test]
    fn listeners_see_changes_only() {
        let timer = service(TimerMode::Local);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let _sub = timer.subscribe(move |state| seen_clone.lock().unwrap().push(state.phase));

        timer.start().expect("start");
        timer.advance(Duration::from_secs(1));
        let _ = timer.start();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![TimerPhase::Running, TimerPhase::Running]
        );
    }
}
