//! Service layer error types

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use robodeck_domain::TimerError;

use crate::ports::outbound::ApiError;

/// Outcome of an operator or system intent that did not go through.
///
/// A successful intent only means "accepted for processing"; there is no
/// error for "accepted but not yet visible".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The backend refused the request, or it never got there
    #[error("{operation} rejected: {source}")]
    Rejected {
        operation: &'static str,
        #[source]
        source: ApiError,
    },

    /// Rejected locally by the match timer before any request was issued
    #[error("match timer intent rejected: {0}")]
    Timer(#[from] TimerError),

    /// The intent needs a running core
    #[error("synchronization core is not running")]
    NotStarted,
}

impl CommandError {
    pub fn rejected(operation: &'static str, source: ApiError) -> Self {
        CommandError::Rejected { operation, source }
    }

    /// Name of the rejected backend operation, if a request was issued.
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            CommandError::Rejected { operation, .. } => Some(*operation),
            _ => None,
        }
    }
}

/// Lifecycle misuse of the synchronization core.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CoreError {
    #[error("synchronization core already started")]
    AlreadyStarted,
    #[error("synchronization core has been stopped")]
    Stopped,
}

/// Helper trait for decoding a raw response into typed data
pub trait ParseResponse {
    /// Decode the response document into the expected type
    fn parse<T: DeserializeOwned>(self, operation: &'static str) -> Result<T, CommandError>;

    /// Accept any successful response, ignoring its body
    fn parse_empty(self, operation: &'static str) -> Result<(), CommandError>;
}

impl ParseResponse for Result<Value, ApiError> {
    fn parse<T: DeserializeOwned>(self, operation: &'static str) -> Result<T, CommandError> {
        let value = self.map_err(|e| CommandError::rejected(operation, e))?;
        serde_json::from_value(value)
            .map_err(|e| CommandError::rejected(operation, ApiError::Decode(e.to_string())))
    }

    fn parse_empty(self, operation: &'static str) -> Result<(), CommandError> {
        self.map(|_| ())
            .map_err(|e| CommandError::rejected(operation, e))
    }
}
