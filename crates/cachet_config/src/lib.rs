//! Configuration for the cachet proxy.
//!
//! Precedence, lowest first: built-in defaults, `cachet.toml`,
//! `CACHET_<SECTION>__<KEY>` environment variables, the legacy `REDIS_URL` /
//! `REDIS_PASSWORD` variables, command-line overrides.

use std::{collections::HashMap, path::PathBuf};

use config::{Environment, File, FileFormat};
use serde::Deserialize;
use tracing::info;

mod cache;
mod server;
mod validation;

pub use cache::{CacheBackend, CacheConfig, LimitConfig};
pub use server::{OriginConfig, ServerConfig};
pub use validation::{validate, ConfigReport, Issue, Severity};

pub const DEFAULT_CONFIG_FILE: &str = "cachet.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration:\n{0}")]
    Invalid(String),
}

/// Values given on the command line; they win over every other source.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<u16>,
    pub origin: Option<String>,
    pub forward_path: Option<bool>,
    pub memory_cache: bool,
}

/// Where configuration is read from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Optional TOML file; a missing file is not an error.
    pub file: Option<PathBuf>,
    /// Environment snapshot. `None` reads the process environment.
    pub env: Option<HashMap<String, String>>,
    pub overrides: Overrides,
}

impl ConfigSources {
    fn var(&self, name: &str) -> Option<String> {
        match &self.env {
            Some(env) => env.get(name).cloned(),
            None => std::env::var(name).ok(),
        }
        .filter(|v| !v.is_empty())
    }
}

// =======================================================
// CACHET CONFIG: main config
// =======================================================
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CachetConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub origin: OriginConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub limit: LimitConfig,
}

impl CachetConfig {
    /// Reads every source without validating the result.
    pub fn from_sources(sources: &ConfigSources) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = &sources.file {
            builder = builder.add_source(
                File::from(path.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("CACHET")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(sources.env.clone()),
        );

        let overrides = &sources.overrides;
        let backend = overrides.memory_cache.then(|| "memory".to_string());

        let built = builder
            .set_override_option("cache.host", sources.var("REDIS_URL"))?
            .set_override_option("cache.password", sources.var("REDIS_PASSWORD"))?
            .set_override_option("cache.backend", backend)?
            .set_override_option("server.port", overrides.port.map(i64::from))?
            .set_override_option("origin.url", overrides.origin.clone())?
            .set_override_option("origin.forward_path", overrides.forward_path)?
            .build()?;

        Ok(built.try_deserialize()?)
    }

    /// Loads and validates. Validation errors are fatal; warnings are logged.
    pub fn load(sources: &ConfigSources) -> Result<Self, ConfigError> {
        let cfg = Self::from_sources(sources)?;

        let report = cfg.validate();
        if report.has_errors() {
            return Err(ConfigError::Invalid(report.to_string()));
        }
        for warning in report.warnings() {
            tracing::warn!(target: "cachet::config", "{warning}");
        }

        Ok(cfg)
    }

    /// Validate the configuration and return a report of warnings and errors.
    pub fn validate(&self) -> ConfigReport {
        validate(self)
    }

    /// Logs the effective configuration, password redacted.
    pub fn log_summary(&self) {
        info!(
            target: "cachet::config",
            listen = ?self.server.listen_addr(),
            max_connections = self.server.max_connections,
            shutdown_grace_secs = self.server.shutdown_grace_secs,
            "[server]"
        );
        info!(
            target: "cachet::config",
            url = ?self.origin.url,
            forward_path = self.origin.forward_path,
            connect_timeout_secs = self.origin.connect_timeout_secs,
            request_timeout_secs = self.origin.request_timeout_secs,
            "[origin]"
        );
        info!(
            target: "cachet::config",
            backend = ?self.cache.backend,
            host = %self.cache.host,
            port = self.cache.port,
            database = self.cache.database,
            password = self.cache.redacted_password(),
            default_ttl_secs = self.cache.default_ttl_secs,
            coalesce_misses = self.cache.coalesce_misses,
            "[cache]"
        );
        info!(
            target: "cachet::config",
            capacity = self.limit.capacity,
            refill_rate = self.limit.refill_rate,
            refill_interval_ms = self.limit.refill_interval_ms,
            "[limit]"
        );
    }
}
