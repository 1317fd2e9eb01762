//! Configuration Loader
//!
//! Environment-aware configuration loading. Sources are layered with the
//! `config` crate, later sources overriding earlier ones:
//!
//! 1. `conductor.{yaml,yml,toml,json}` in the configuration directory (optional)
//! 2. `conductor.<environment>.{yaml,yml,toml,json}` (optional)
//! 3. `CONDUCTOR__`-prefixed environment variables, `__` separating levels,
//!    e.g. `CONDUCTOR__SERVICES_CONDUCTOR__MAX_WORKERS=8`

use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::EnhancementConfig;
use crate::error::Result;

const CONFIG_FILE_STEM: &str = "conductor";
const CONFIG_EXTENSIONS: [&str; 4] = ["yaml", "yml", "toml", "json"];
const ENV_PREFIX: &str = "CONDUCTOR";

/// Loaded, validated configuration plus the context it was loaded from
#[derive(Debug)]
pub struct ConfigManager {
    config: EnhancementConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> Result<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> Result<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> Result<Arc<ConfigManager>> {
        Self::load_with_env_prefix(config_dir, environment, ENV_PREFIX)
    }

    pub(crate) fn load_with_env_prefix(
        config_dir: Option<PathBuf>,
        environment: &str,
        env_prefix: &str,
    ) -> Result<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let mut builder = Config::builder();
        let base_name = CONFIG_FILE_STEM.to_string();
        let overlay_name = format!("{CONFIG_FILE_STEM}.{environment}");
        for name in [base_name, overlay_name] {
            if let Some(path) = Self::find_config_file(&config_directory, &name) {
                debug!("Adding configuration source: {}", path.display());
                builder = builder.add_source(File::from(path));
            }
        }

        let config: EnhancementConfig = builder
            .add_source(
                Environment::with_prefix(env_prefix)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;

        info!(
            environment = %environment,
            services_workers = config.services_conductor.max_workers,
            solr_update_workers = config.solr_update_conductor.max_workers,
            catch_up_enabled = config.catch_up.enabled,
            "⚙️ CONFIG: Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration, validating it first
    pub fn from_config(config: EnhancementConfig) -> Result<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            config_directory: Self::default_config_directory(),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &EnhancementConfig {
        &self.config
    }

    /// Configuration as JSON for status pages and debug logging
    pub fn debug_config(&self) -> serde_json::Value {
        serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null)
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// First `<name>.<ext>` present in the directory, by extension preference
    fn find_config_file(config_directory: &Path, name: &str) -> Option<PathBuf> {
        CONFIG_EXTENSIONS
            .iter()
            .map(|ext| config_directory.join(format!("{name}.{ext}")))
            .find(|path| path.is_file())
    }

    fn detect_environment() -> String {
        env::var("CONDUCTOR_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        env::var("CONDUCTOR_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }
}
