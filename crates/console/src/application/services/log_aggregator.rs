//! Log Aggregator - operator-facing activity log derived from push events.
//!
//! A fixed table maps qualifying event types to a severity and message
//! template; every qualifying event yields exactly one [`LogEntry`]. History is
//! bounded and FIFO. Listeners get the full history as an immutable snapshot
//! on subscribe and after every change.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use robodeck_domain::{LogEntry, LogLevel};
use robodeck_shared::event_types::*;
use robodeck_shared::{ControllerEventData, EmergencyStopData, RobotEventData, ServerEvent};

use crate::infrastructure::lock;
use crate::infrastructure::messaging::{EventBus, Listeners, Subscription};
use crate::ports::outbound::ClockPort;

/// Event types that produce a log entry.
pub const LOGGED_EVENTS: &[&str] = &[
    ROBOT_CONNECTED,
    ROBOT_DISCONNECTED,
    ROBOT_ENABLED,
    ROBOT_DISABLED,
    ROBOTS_REFRESHING,
    CONTROLLER_CONNECTED,
    CONTROLLER_DISCONNECTED,
    CONTROLLER_PAIRED,
    CONTROLLER_UNPAIRED,
    CONTROLLER_ENABLED,
    CONTROLLER_DISABLED,
    CONTROLLERS_REFRESHING,
    EMERGENCY_STOP,
];

const UNKNOWN: &str = "unknown";

fn robot_label(event: &ServerEvent) -> String {
    event
        .decode::<RobotEventData>()
        .map(|data| data.label().to_string())
        .unwrap_or_else(|_| UNKNOWN.to_string())
}

fn controller_data(event: &ServerEvent) -> (String, String) {
    match event.decode::<ControllerEventData>() {
        Ok(data) => (
            data.controller_id.to_string(),
            data.robot_id
                .map(|r| r.to_string())
                .unwrap_or_else(|| UNKNOWN.to_string()),
        ),
        Err(_) => (UNKNOWN.to_string(), UNKNOWN.to_string()),
    }
}

/// Derive the log entry for one event, or `None` if the type is not logged.
///
/// Malformed payloads still produce an entry, with `unknown` in place of the
/// missing identifiers.
pub fn derive_log_entry(event: &ServerEvent, now: DateTime<Utc>) -> Option<LogEntry> {
    let (level, message) = match event.event_type.as_str() {
        ROBOT_CONNECTED => (
            LogLevel::Success,
            format!("Robot {} connected successfully", robot_label(event)),
        ),
        ROBOT_DISCONNECTED => (
            LogLevel::Info,
            format!("Robot {} disconnected", robot_label(event)),
        ),
        ROBOT_ENABLED => (
            LogLevel::Info,
            format!("Robot {} enabled", robot_label(event)),
        ),
        ROBOT_DISABLED => (
            LogLevel::Warning,
            format!("Robot {} disabled", robot_label(event)),
        ),
        ROBOTS_REFRESHING => (LogLevel::Info, "Scanning for robots...".to_string()),
        CONTROLLER_CONNECTED => (
            LogLevel::Success,
            format!("Controller {} connected", controller_data(event).0),
        ),
        CONTROLLER_DISCONNECTED => (
            LogLevel::Warning,
            format!("Controller {} disconnected", controller_data(event).0),
        ),
        CONTROLLER_PAIRED => {
            let (controller, robot) = controller_data(event);
            (
                LogLevel::Success,
                format!("Controller {controller} paired with robot {robot}"),
            )
        }
        CONTROLLER_UNPAIRED => (
            LogLevel::Info,
            format!("Controller {} unpaired", controller_data(event).0),
        ),
        CONTROLLER_ENABLED => (
            LogLevel::Info,
            format!("Controller {} enabled", controller_data(event).0),
        ),
        CONTROLLER_DISABLED => (
            LogLevel::Warning,
            format!("Controller {} disabled", controller_data(event).0),
        ),
        CONTROLLERS_REFRESHING => (LogLevel::Info, "Scanning for controllers...".to_string()),
        EMERGENCY_STOP => {
            let active = event
                .decode::<EmergencyStopData>()
                .map(|data| data.active)
                // An estop event without a readable flag is treated as activation.
                .unwrap_or(true);
            if active {
                (
                    LogLevel::Error,
                    "EMERGENCY STOP ACTIVATED - All operations halted".to_string(),
                )
            } else {
                (
                    LogLevel::Success,
                    "Emergency stop deactivated - Systems operational".to_string(),
                )
            }
        }
        _ => return None,
    };

    Some(LogEntry::new(level, message, now))
}

#[derive(Clone)]
pub struct LogAggregator {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
    capacity: usize,
    listeners: Listeners<Arc<[LogEntry]>>,
    clock: Arc<dyn ClockPort>,
}

impl LogAggregator {
    pub fn new(capacity: usize, clock: Arc<dyn ClockPort>) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity + 1))),
            capacity,
            listeners: Listeners::new(),
            clock,
        }
    }

    /// Subscribe to every logged event type on `bus`.
    pub fn attach(&self, bus: &EventBus) -> Vec<Subscription> {
        let aggregator = self.clone();
        bus.subscribe_many(LOGGED_EVENTS, move |event| {
            aggregator.handle_event(event);
        })
    }

    /// Derive and append the entry for `event`, if it is a logged type.
    pub fn handle_event(&self, event: &ServerEvent) -> Option<LogEntry> {
        let entry = derive_log_entry(event, self.clock.now())?;
        self.append(entry.clone());
        Some(entry)
    }

    /// Append at the end, evicting the oldest entries beyond capacity.
    pub fn append(&self, entry: LogEntry) {
        tracing::debug!(level = %entry.level, message = %entry.message, "Log entry");
        let snapshot = {
            let mut entries = lock(&self.entries);
            entries.push_back(entry);
            while entries.len() > self.capacity {
                entries.pop_front();
            }
            Self::snapshot_of(&entries)
        };
        self.listeners.notify(snapshot);
    }

    /// Register `listener`. It immediately receives the current history, then
    /// a fresh snapshot after every append or clear.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(Arc<[LogEntry]>) + Send + Sync + 'static,
    {
        let listener: Arc<dyn Fn(Arc<[LogEntry]>) + Send + Sync> = Arc::new(listener);
        let subscription = self.listeners.add(Arc::clone(&listener));
        listener(self.entries());
        subscription
    }

    /// Empty the history and notify listeners with an empty snapshot.
    pub fn clear(&self) {
        lock(&self.entries).clear();
        tracing::debug!("Log cleared");
        self.listeners.notify(Arc::from(Vec::new()));
    }

    /// Current history, oldest first.
    pub fn entries(&self) -> Arc<[LogEntry]> {
        Self::snapshot_of(&lock(&self.entries))
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn snapshot_of(entries: &VecDeque<LogEntry>) -> Arc<[LogEntry]> {
        entries.iter().cloned().collect()
    }
}
