//! # Enhancement Failure Severity
//!
//! Failures raised by enhancement services carry a [`Severity`] that alone
//! decides how a conductor reacts. The conductor never looks at the message
//! or the wrapped source error.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure tier declared by an enhancement service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Transient problem; the descriptor is retried after a delay
    Recoverable,
    /// Object-specific problem; recorded, processing continues
    Unrecoverable,
    /// Systemic problem; recorded and the conductor pauses
    Fatal,
    /// Error without a declared tier, handled like `Unrecoverable`
    Unclassified,
}

impl Severity {
    /// Whether the failure leaves a record in the failure registry
    pub fn is_recorded(&self) -> bool {
        !matches!(self, Severity::Recoverable)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Recoverable => write!(f, "RECOVERABLE"),
            Severity::Unrecoverable => write!(f, "UNRECOVERABLE"),
            Severity::Fatal => write!(f, "FATAL"),
            Severity::Unclassified => write!(f, "UNCLASSIFIED"),
        }
    }
}

/// Error returned by an enhancement service
#[derive(Debug, Error)]
#[error("{severity} failure in {}: {message}", .service.as_deref().unwrap_or("<unknown service>"))]
pub struct EnhancementError {
    pub severity: Severity,
    pub service: Option<String>,
    pub message: String,
    #[source]
    pub source: Option<BoxedSource>,
}

impl EnhancementError {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            service: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn recoverable(message: impl Into<String>) -> Self {
        Self::new(Severity::Recoverable, message)
    }

    pub fn unrecoverable(message: impl Into<String>) -> Self {
        Self::new(Severity::Unrecoverable, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(Severity::Fatal, message)
    }

    pub fn unclassified(message: impl Into<String>) -> Self {
        Self::new(Severity::Unclassified, message)
    }

    /// Attach the underlying cause
    pub fn with_source(mut self, source: impl Into<BoxedSource>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Name the service that raised the failure, unless already named
    pub fn for_service(mut self, service: &str) -> Self {
        if self.service.is_none() {
            self.service = Some(service.to_string());
        }
        self
    }
}

/// Any foreign error without a declared tier is unclassified.
impl From<anyhow::Error> for EnhancementError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            severity: Severity::Unclassified,
            service: None,
            message: err.to_string(),
            source: Some(err.into()),
        }
    }
}

pub type EnhancementResult<T> = std::result::Result<T, EnhancementError>;
