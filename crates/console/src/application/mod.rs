//! Application layer: the services that make up the synchronization core and
//! their error types.

pub mod error;
pub mod services;
