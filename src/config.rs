use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use salvage_protocol::object::DEFAULT_MAX_OBJECT_SIZE;

use crate::remote::RetryPolicy;
use crate::traverse::TraversalOptions;

const DEFAULT_WORKERS: usize = 8;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Global configuration (from ~/.salvage.toml). Every key is optional.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct GlobalConfig {
    #[serde(default)]
    pub workers: Option<usize>,

    #[serde(default)]
    pub max_retries: Option<u32>,

    #[serde(default)]
    pub initial_backoff_ms: Option<u64>,

    #[serde(default)]
    pub max_backoff_ms: Option<u64>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub user_agent: Option<String>,

    #[serde(default)]
    pub max_object_size: Option<u64>,
}

/// Effective configuration: CLI flags > global file > defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub workers: usize,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    pub user_agent: String,
    pub max_object_size: u64,
}

impl Config {
    /// Load with precedence: global file > defaults.
    pub fn load() -> Result<Self> {
        let global = Self::load_global()
            .context("Failed to load global config")?
            .unwrap_or_default();

        Ok(Self::merge(global))
    }

    /// Load from an explicit file instead of the home directory.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Self::merge(Self::parse(&content)?))
    }

    pub fn parse(content: &str) -> Result<GlobalConfig> {
        toml::from_str(content).context("Failed to parse .salvage.toml")
    }

    fn load_global() -> Result<Option<GlobalConfig>> {
        let Some(mut path) = dirs::home_dir() else {
            return Ok(None);
        };
        path.push(".salvage.toml");

        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Ok(Some(Self::parse(&content)?))
    }

    fn merge(global: GlobalConfig) -> Self {
        let defaults = RetryPolicy::default();
        Self {
            workers: global.workers.unwrap_or(DEFAULT_WORKERS).max(1),
            retry: RetryPolicy {
                max_attempts: global
                    .max_retries
                    .map(|r| r.saturating_add(1))
                    .unwrap_or(defaults.max_attempts),
                initial_backoff: global
                    .initial_backoff_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.initial_backoff),
                max_backoff: global
                    .max_backoff_ms
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.max_backoff),
            },
            timeout: Duration::from_secs(global.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
            user_agent: global
                .user_agent
                .unwrap_or_else(|| format!("salvage/{}", env!("CARGO_PKG_VERSION"))),
            max_object_size: global
                .max_object_size
                .unwrap_or(DEFAULT_MAX_OBJECT_SIZE),
        }
    }

    /// Apply command-line overrides. `retries` counts retries, not attempts.
    pub fn with_overrides(mut self, workers: Option<usize>, retries: Option<u32>) -> Self {
        if let Some(workers) = workers {
            self.workers = workers.max(1);
        }
        if let Some(retries) = retries {
            self.retry.max_attempts = retries.saturating_add(1);
        }
        self
    }

    pub fn traversal_options(&self) -> TraversalOptions {
        TraversalOptions {
            workers: self.workers,
            retry: self.retry.clone(),
            max_object_size: self.max_object_size,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::merge(GlobalConfig::default())
    }
}
