//! # Conductor Configuration
//!
//! Typed configuration for the conductors, the failure registry and the
//! catch-up reconciler. Every section is optional in the configuration file;
//! omitted values fall back to [`crate::constants::defaults`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use conductor_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let workers = manager.config().services_conductor.max_workers;
//! # Ok(())
//! # }
//! ```

pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::defaults;
use crate::error::{ConductorError, Result};

pub use loader::ConfigManager;

/// Root configuration structure mirroring conductor.yaml
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EnhancementConfig {
    /// Conductor running enhancement service pipelines
    pub services_conductor: ConductorConfig,

    /// Conductor applying search index updates
    pub solr_update_conductor: ConductorConfig,

    /// Failure bookkeeping shared by both conductors' settings
    pub failure_registry: FailureRegistryConfig,

    /// Catch-up reconciliation settings
    pub catch_up: CatchUpConfig,
}

impl Default for EnhancementConfig {
    fn default() -> Self {
        Self {
            services_conductor: ConductorConfig::default(),
            solr_update_conductor: ConductorConfig {
                max_workers: defaults::SOLR_UPDATE_MAX_WORKERS,
                ..ConductorConfig::default()
            },
            failure_registry: FailureRegistryConfig::default(),
            catch_up: CatchUpConfig::default(),
        }
    }
}

impl EnhancementConfig {
    pub fn validate(&self) -> Result<()> {
        self.services_conductor.validate("services_conductor")?;
        self.solr_update_conductor.validate("solr_update_conductor")?;
        self.failure_registry.validate()?;
        self.catch_up.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConductorConfig {
    /// Size of the worker pool
    pub max_workers: usize,

    /// Delay before a descriptor that failed recoverably is dispatched again
    pub recoverable_retry_delay_ms: u64,

    /// Start in the paused state; an operator must resume
    pub start_paused: bool,
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            max_workers: defaults::MAX_WORKERS,
            recoverable_retry_delay_ms: defaults::RECOVERABLE_RETRY_DELAY_MS,
            start_paused: false,
        }
    }
}

impl ConductorConfig {
    pub fn recoverable_retry_delay(&self) -> Duration {
        Duration::from_millis(self.recoverable_retry_delay_ms)
    }

    fn validate(&self, section: &str) -> Result<()> {
        if self.max_workers == 0 {
            return Err(ConductorError::ConfigurationError(format!(
                "{section}.max_workers must be at least 1"
            )));
        }
        if self.recoverable_retry_delay_ms == 0 {
            return Err(ConductorError::ConfigurationError(format!(
                "{section}.recoverable_retry_delay_ms must be greater than 0"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FailureRegistryConfig {
    /// Records kept before the oldest is evicted
    pub max_entries: usize,
    /// Seconds after the last failure before a record expires
    pub expiry_seconds: u64,
}

impl Default for FailureRegistryConfig {
    fn default() -> Self {
        Self {
            max_entries: defaults::FAILURE_REGISTRY_MAX_ENTRIES,
            expiry_seconds: defaults::FAILURE_EXPIRY_SECONDS,
        }
    }
}

impl FailureRegistryConfig {
    fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(ConductorError::ConfigurationError(
                "failure_registry.max_entries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CatchUpConfig {
    /// Whether the periodic schedule runs at all
    pub enabled: bool,
    /// Candidates requested from a service per page
    pub page_size: usize,
    /// Seconds between scheduled passes
    pub interval_seconds: u64,
}

impl Default for CatchUpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            page_size: defaults::CATCH_UP_PAGE_SIZE,
            interval_seconds: defaults::CATCH_UP_INTERVAL_SECONDS,
        }
    }
}

impl CatchUpConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(ConductorError::ConfigurationError(
                "catch_up.page_size must be at least 1".to_string(),
            ));
        }
        if self.enabled && self.interval_seconds == 0 {
            return Err(ConductorError::ConfigurationError(
                "catch_up.interval_seconds must be greater than 0 when enabled".to_string(),
            ));
        }
        Ok(())
    }
}
