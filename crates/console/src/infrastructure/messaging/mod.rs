//! In-process messaging: the event bus, snapshot listeners and the connection
//! state shared with observers.

pub mod connection;
pub mod event_bus;
pub mod listeners;
pub mod subscription;

pub use connection::{ConnectionState, ConnectionStateObserver};
pub use event_bus::{EventBus, EventHandler};
pub use listeners::{Listener, Listeners};
pub use subscription::Subscription;
