//! Configuration management for the ledger submitter
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::tx::STANDALONE_PASSPHRASE;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "LEDGER_SUBMITTER_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

lazy_static! {
    static ref ENV_PLACEHOLDER: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub network: NetworkConfig,
    pub submitter: SubmitterConfig,
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub passphrase: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            passphrase: STANDALONE_PASSPHRASE.to_string(),
        }
    }
}

/// Defaults for every submission; a request may override them per call
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SubmitterConfig {
    pub max_tries: u32,
    pub base_fee: u32,
    pub timeout_ms: u64,
    pub rate_limit_cooldown_ms: u64,
    pub timeout_settle_ms: u64,
    pub backoff_floor_ms: u64,
    pub backoff_step_ms: u64,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            max_tries: 10,
            base_fee: 100,
            timeout_ms: 15_000,
            rate_limit_cooldown_ms: 2_000,
            timeout_settle_ms: 1_000,
            backoff_floor_ms: 100,
            backoff_step_ms: 1_000,
        }
    }
}

impl SubmitterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Parameters of the contention simulation run by the binary
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub writers: usize,
    pub payments_per_writer: usize,
    pub seed: Option<u64>,
    /// Throttle every n-th submission, 0 disables
    pub fault_rate_limit_every: u64,
    /// Time out every n-th submission, 0 disables
    pub fault_timeout_every: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            writers: 4,
            payments_per_writer: 5,
            seed: None,
            fault_rate_limit_every: 0,
            fault_timeout_every: 0,
        }
    }
}

impl Settings {
    /// Load settings from the file named by `LEDGER_SUBMITTER_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    /// Parse settings from TOML text
    pub fn parse(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.network.passphrase.trim().is_empty() {
            anyhow::bail!("Network passphrase must not be empty");
        }

        let submitter = &self.submitter;
        if submitter.base_fee == 0 {
            anyhow::bail!("Base fee must be positive");
        }
        if submitter.timeout_ms == 0 {
            anyhow::bail!("Submission timeout must be positive");
        }
        if submitter.backoff_floor_ms >= submitter.backoff_step_ms {
            anyhow::bail!(
                "Backoff floor {}ms must be below the first backoff ceiling {}ms",
                submitter.backoff_floor_ms,
                submitter.backoff_step_ms
            );
        }

        if self.simulation.writers == 0 {
            tracing::warn!("Simulation has no writers configured");
        }

        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    ENV_PLACEHOLDER
        .replace_all(input, |cap: &regex::Captures| {
            env::var(&cap[1]).unwrap_or_default()
        })
        .into_owned()
}
