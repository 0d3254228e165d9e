//! Robodeck console synchronization core.
//!
//! Keeps a local, read-only view of the robot fleet (robots, controllers, the
//! match timer and the emergency-stop interlock) consistent with the backend
//! over two independent channels: a WebSocket push channel and a REST request
//! surface. Presentation layers subscribe to the core; they never mutate it.

pub mod application;
pub mod config;
pub mod infrastructure;
pub mod ports;
pub mod sync_core;

pub use application::error::{CommandError, CoreError};
pub use application::services::{
    CommandGateway, Diagnostic, DiagnosticKind, Diagnostics, EntityStore, LogAggregator,
    MatchTimerService, NetworkMonitor, PendingIntent, RefreshTarget, TimerMode,
};
pub use config::{ConfigError, ConsoleConfig};
pub use infrastructure::messaging::{
    ConnectionState, ConnectionStateObserver, EventBus, Subscription,
};
pub use infrastructure::websocket::{
    ReconnectPolicy, TransportError, TransportEvent, TransportManager,
};
pub use ports::outbound::{ApiError, ClockPort, RawApiPort};
pub use sync_core::SyncCore;
