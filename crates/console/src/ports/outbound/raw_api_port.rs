//! Raw API Port - Object-safe HTTP boundary
//!
//! `RawApiPort` is the boundary implemented by transport adapters. It knows
//! nothing about robots or timers: it executes one [`ApiRequest`] and hands back
//! the response document. Typed decoding happens one layer up, in the
//! `CommandGateway`.

use serde_json::Value;
use thiserror::Error;

use robodeck_shared::ApiRequest;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The request never produced a response (connect failure, reset, ...)
    #[error("request failed: {0}")]
    Request(String),

    /// The backend answered with a non-success status
    #[error("backend returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// The response body did not have the expected shape
    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("request timed out")]
    Timeout,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RawApiPort: Send + Sync {
    /// Execute one request. Returns `Value::Null` when the backend sent no body.
    async fn execute(&self, request: &ApiRequest) -> Result<Value, ApiError>;
}
