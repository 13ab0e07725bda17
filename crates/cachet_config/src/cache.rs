use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Redis,
    /// In-process map; nothing survives a restart.
    Memory,
}

// =======================================================
// CACHE CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub database: u32,
    pub default_ttl_secs: u64,
    pub op_timeout_ms: u64,
    pub pool_size: usize,
    /// Serialize concurrent misses for the same key.
    pub coalesce_misses: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Redis,
            host: String::new(),
            port: 6379,
            password: None,
            database: 0,
            default_ttl_secs: 24 * 60 * 60,
            op_timeout_ms: 2000,
            pool_size: 16,
            coalesce_misses: false,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    /// Password as it may appear in logs.
    pub fn redacted_password(&self) -> &'static str {
        match self.password.as_deref() {
            Some(p) if !p.is_empty() => "<redacted>",
            _ => "<none>",
        }
    }
}

// =======================================================
// LIMIT CONFIG + DEFAULTS (token bucket)
// =======================================================
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitConfig {
    pub capacity: u64,
    pub refill_rate: u64,
    pub refill_interval_ms: u64,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            refill_rate: 10,
            refill_interval_ms: 1000,
        }
    }
}

impl LimitConfig {
    pub fn refill_interval(&self) -> Duration {
        Duration::from_millis(self.refill_interval_ms)
    }
}
