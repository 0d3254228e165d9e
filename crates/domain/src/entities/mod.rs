//! Fleet entities as reported by the backend, plus locally derived log entries.

mod controller;
mod log_entry;
mod robot;

pub use controller::Controller;
pub use log_entry::{LogEntry, LogLevel};
pub use robot::{Robot, RobotStatus};
