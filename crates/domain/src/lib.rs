//! Robodeck Domain - entities and rules for the operator console.
//!
//! Pure types only: no I/O, no runtime. The console crate owns transport,
//! scheduling and fan-out; everything here can be exercised synchronously.

pub mod entities;
pub mod error;
pub mod ids;
pub mod invariants;
pub mod match_timer;

pub use entities::{Controller, LogEntry, LogLevel, Robot, RobotStatus};
pub use error::DomainError;
pub use ids::{ControllerId, LogEntryId, RobotId};
pub use invariants::{check_snapshot, InvariantViolation};
pub use match_timer::{
    MatchTimer, MatchTimerState, TickOutcome, TimerError, TimerPhase, DEFAULT_MATCH_DURATION_MS,
};
