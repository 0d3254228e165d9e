//! Application services
//!
//! Each service owns one slice of the console's view of the fleet. They are
//! cheap `Clone` handles over shared state so the core loop, bus handlers and
//! operator calls can all hold one.

pub mod command_gateway;
pub mod diagnostics;
pub mod entity_store;
pub mod log_aggregator;
pub mod match_timer_service;
pub mod network_monitor;

pub use command_gateway::CommandGateway;
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use entity_store::{Collection, EntityStore, PendingIntent, RefreshTarget};
pub use log_aggregator::{derive_log_entry, LogAggregator, LOGGED_EVENTS};
pub use match_timer_service::{MatchTimerService, TimerEventError, TimerMode};
pub use network_monitor::NetworkMonitor;
