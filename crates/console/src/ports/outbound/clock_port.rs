use chrono::{DateTime, Utc};

/// Wall clock used to stamp log entries and diagnostics.
#[cfg_attr(test, mockall::automock)]
pub trait ClockPort: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
