//! Robodeck Protocol - Shared types for backend and console communication
//!
//! This crate contains the types exchanged with the fleet backend:
//! - Push channel envelope (`ServerEvent`) and its type tags
//! - Typed payloads for the events the console reacts to
//! - The request surface (`ApiRequest`) and its response DTOs
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - Only serde, serde_json, thiserror and the domain crate
//! 2. **No business logic** - Pure data types and serialization
//! 3. **Tolerant decoding** - Unknown event types are carried, not rejected

pub mod messages;
pub mod requests;
pub mod responses;

pub use messages::{
    event_types, parse_server_event, ControllerEventData, ControllersUpdatedData,
    DurationChangedData, EmergencyStopData, MatchStartData, ProtocolError, RefreshingData,
    RobotEventData, ServerEvent, TimerUpdateData,
};
pub use requests::{ApiRequest, HttpMethod, RequestBody};
pub use responses::{CommandAck, HealthStatus, MatchTimerSnapshot, NetworkStats};

// Entity types are part of the wire format
pub use robodeck_domain::{Controller, ControllerId, Robot, RobotId, RobotStatus};
