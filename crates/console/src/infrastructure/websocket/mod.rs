//! Push channel client.
//!
//! - `reconnect`: pure fixed-delay reconnect policy (no runtime dependency)
//! - `transport`: tokio-tungstenite connection task and its manager handle

mod reconnect;
mod transport;

pub use reconnect::ReconnectPolicy;
pub use transport::{TransportError, TransportEvent, TransportManager};
