//! Configuration management for the signup guard.
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! `SIGNUP_GUARD__*` environment variables (`__` separates sections, e.g.
//! `SIGNUP_GUARD__STORE__URL`).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{GuardError, Result};
use crate::ratelimit::{PolicyRules, PolicyTable, DEFAULT_NAMESPACE};
use crate::store::{CounterStore, MemoryStore, RedisStore};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "SIGNUP_GUARD";

/// Main configuration for the signup guard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Counter store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Evaluation settings
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Policy rows replacing the built-in defaults, by use case then scope
    #[serde(default)]
    pub policies: PolicyRules,
}

/// Which counter store implementation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    /// Process-local; only useful for tests and dry runs
    Memory,
}

/// Counter store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// Redis connection URL
    #[serde(default = "default_store_url")]
    pub url: String,

    /// Per-operation timeout in milliseconds
    #[serde(default = "default_store_timeout")]
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: default_store_url(),
            timeout_ms: default_store_timeout(),
        }
    }
}

fn default_backend() -> StoreBackend {
    StoreBackend::Redis
}

fn default_store_url() -> String {
    "redis://127.0.0.1:6379/".to_string()
}

fn default_store_timeout() -> u64 {
    750
}

/// Evaluation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Key namespace every policy prefix starts with
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Upper bound for one scope check, in milliseconds
    #[serde(default = "default_check_timeout")]
    pub check_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            check_timeout_ms: default_check_timeout(),
        }
    }
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_check_timeout() -> u64 {
    1000
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl GuardConfig {
    /// Load configuration from defaults, an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            if !path.exists() {
                return Err(GuardError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Yaml),
            );
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: GuardConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| GuardError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Resolve and validate the policy table.
    pub fn policy_table(&self) -> Result<PolicyTable> {
        PolicyTable::new(&self.limits.namespace, &self.policies)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.limits.check_timeout_ms)
    }

    /// Build the configured counter store.
    pub fn build_store(&self) -> Result<Arc<dyn CounterStore>> {
        match self.store.backend {
            StoreBackend::Redis => Ok(Arc::new(RedisStore::new(
                &self.store.url,
                Duration::from_millis(self.store.timeout_ms),
            )?)),
            StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        }
    }
}
