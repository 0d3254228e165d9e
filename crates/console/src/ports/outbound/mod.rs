//! Outbound ports - Interfaces for external services
//!
//! The core reaches the backend and the wall clock only through these traits,
//! so tests can substitute recording fakes or `mockall` mocks.

pub mod clock_port;
pub mod raw_api_port;

pub use clock_port::ClockPort;
pub use raw_api_port::{ApiError, RawApiPort};

#[cfg(test)]
pub use clock_port::MockClockPort;
#[cfg(test)]
pub use raw_api_port::MockRawApiPort;
