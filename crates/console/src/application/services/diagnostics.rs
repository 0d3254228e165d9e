//! Diagnostics - bounded record of non-fatal failures.
//!
//! Nothing in the core terminates on failure. Whatever went wrong ends up
//! here (and in the tracing output) instead.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use robodeck_domain::{InvariantViolation, TimerError};
use robodeck_shared::ProtocolError;

use crate::application::error::CommandError;
use crate::infrastructure::lock;
use crate::infrastructure::websocket::TransportError;
use crate::ports::outbound::ClockPort;

#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticKind {
    /// Push channel failure; a reconnect follows
    Transport(TransportError),
    /// A push frame was dropped
    Protocol(ProtocolError),
    /// A request issued by the core itself was rejected
    Command {
        operation: &'static str,
        message: String,
    },
    /// An installed snapshot broke an invariant
    Invariant(InvariantViolation),
    /// The match timer refused a transition
    TimerRejected(TimerError),
}

impl DiagnosticKind {
    pub fn is_invariant(&self) -> bool {
        matches!(self, DiagnosticKind::Invariant(_))
    }
}

impl From<&CommandError> for DiagnosticKind {
    fn from(error: &CommandError) -> Self {
        match error {
            CommandError::Timer(e) => DiagnosticKind::TimerRejected(*e),
            other => DiagnosticKind::Command {
                operation: other.operation().unwrap_or("unknown"),
                message: other.to_string(),
            },
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::Transport(e) => write!(f, "transport: {e}"),
            DiagnosticKind::Protocol(e) => write!(f, "protocol: {e}"),
            DiagnosticKind::Command { message, .. } => write!(f, "command: {message}"),
            DiagnosticKind::Invariant(v) => write!(f, "invariant: {v}"),
            DiagnosticKind::TimerRejected(e) => write!(f, "timer: {e}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub at: DateTime<Utc>,
    pub kind: DiagnosticKind,
}

#[derive(Clone)]
pub struct Diagnostics {
    entries: Arc<Mutex<VecDeque<Diagnostic>>>,
    capacity: usize,
    clock: Arc<dyn ClockPort>,
}

impl Diagnostics {
    pub fn new(capacity: usize, clock: Arc<dyn ClockPort>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
            clock,
        }
    }

    pub fn record(&self, kind: DiagnosticKind) {
        match &kind {
            DiagnosticKind::Invariant(violation) => {
                tracing::error!(violation = %violation, "Snapshot invariant violated")
            }
            DiagnosticKind::Transport(error) => {
                tracing::warn!(error = %error, "Transport diagnostic")
            }
            DiagnosticKind::Protocol(error) => {
                tracing::warn!(error = %error, "Protocol diagnostic")
            }
            DiagnosticKind::Command { operation, message } => {
                tracing::warn!(operation, message = %message, "Command rejected")
            }
            DiagnosticKind::TimerRejected(error) => {
                tracing::warn!(error = %error, "Timer transition rejected")
            }
        }

        let diagnostic = Diagnostic {
            at: self.clock.now(),
            kind,
        };
        let mut entries = lock(&self.entries);
        entries.push_back(diagnostic);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    pub fn record_command(&self, error: &CommandError) {
        self.record(DiagnosticKind::from(error));
    }

    pub fn entries(&self) -> Vec<Diagnostic> {
        lock(&self.entries).iter().cloned().collect()
    }

    pub fn invariant_violations(&self) -> Vec<InvariantViolation> {
        lock(&self.entries)
            .iter()
            .filter_map(|d| match &d.kind {
                DiagnosticKind::Invariant(v) => Some(v.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::clock::FixedClock;
    use crate::ports::outbound::ApiError;
    use chrono::TimeZone;

    fn diagnostics(capacity: usize) -> Diagnostics {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        Diagnostics::new(capacity, Arc::new(FixedClock(now)))
    }

    #[test]
    fn keeps_only_the_newest_entries() {
        let diagnostics = diagnostics(3);
        for n in 0..5 {
            diagnostics.record(DiagnosticKind::Protocol(ProtocolError::BinaryFrame(n)));
        }

        let kinds: Vec<_> = diagnostics.entries().into_iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![
                DiagnosticKind::Protocol(ProtocolError::BinaryFrame(2)),
                DiagnosticKind::Protocol(ProtocolError::BinaryFrame(3)),
                DiagnosticKind::Protocol(ProtocolError::BinaryFrame(4)),
            ]
        );
    }

    #[test]
    fn command_errors_map_to_their_kind() {
        let rejected = CommandError::rejected("pair_controller", ApiError::Timeout);
        assert!(matches!(
            DiagnosticKind::from(&rejected),
            DiagnosticKind::Command {
                operation: "pair_controller",
                ..
            }
        ));

        let timer = CommandError::Timer(TimerError::DurationLockedWhileRunning);
        assert_eq!(
            DiagnosticKind::from(&timer),
            DiagnosticKind::TimerRejected(TimerError::DurationLockedWhileRunning)
        );
    }
}
