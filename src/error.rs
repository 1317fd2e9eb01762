//! Error types for the conductor system.
//!
//! Task-level failures raised by enhancement services live in
//! [`crate::services::errors`]; this module covers failures of the
//! conductor machinery itself (lifecycle, configuration, routing).

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConductorError {
    #[error("Conductor {conductor} is shutting down")]
    ShuttingDown { conductor: String },
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Unknown conductor: {0}")]
    UnknownConductor(String),
    #[error("Catch-up pass is already active")]
    CatchUpAlreadyActive,
}

impl From<config::ConfigError> for ConductorError {
    fn from(err: config::ConfigError) -> Self {
        ConductorError::ConfigurationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConductorError>;
