//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The credential store path may be overridden with API_SETUP_STORE.

use serde::Deserialize;
use setup_flow::SetupConfig;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Give up on the browser flow after this many seconds
    #[serde(default)]
    pub flow_timeout_secs: Option<u64>,
    #[serde(default)]
    pub setup: SetupConfig,
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Remote credential check
#[derive(Debug, Deserialize)]
pub struct ValidatorConfig {
    pub url: String,
    #[serde(default = "default_validator_timeout")]
    pub timeout_secs: u64,
}

/// Where validated credentials are persisted
#[derive(Debug, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_validator_timeout() -> u64 {
    15
}

fn default_store_path() -> PathBuf {
    PathBuf::from("api-credentials.json")
}

impl ValidatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        config.validate()?;

        if let Ok(store_path) = std::env::var("API_SETUP_STORE") {
            let store_path = store_path.trim();
            if !store_path.is_empty() {
                config.store.path = PathBuf::from(store_path);
            }
        }

        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.validator.url.starts_with("http://") && !self.validator.url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "validator.url must start with http:// or https://, got: {}",
                self.validator.url
            )));
        }

        if !self.setup.bind_addr.is_loopback() {
            return Err(common::Error::Config(format!(
                "setup.bind_addr must be a loopback address, got: {}",
                self.setup.bind_addr
            )));
        }

        let non_zero = [
            ("validator.timeout_secs", self.validator.timeout_secs),
            ("setup.request_timeout_secs", self.setup.request_timeout_secs),
            ("setup.drain_timeout_secs", self.setup.drain_timeout_secs),
            (
                "setup.rate_limit.max_attempts",
                u64::from(self.setup.rate_limit.max_attempts),
            ),
            ("setup.rate_limit.window_secs", self.setup.rate_limit.window_secs),
            (
                "setup.rate_limit.cleanup_interval_secs",
                self.setup.rate_limit.cleanup_interval_secs,
            ),
            ("flow_timeout_secs", self.flow_timeout_secs.unwrap_or(1)),
        ];
        for (name, value) in non_zero {
            if value == 0 {
                return Err(common::Error::Config(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&Path>) -> PathBuf {
        if let Some(p) = cli_path {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("api-setup.toml")
    }
}
