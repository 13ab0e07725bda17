use std::fmt;

use url::Url;

use crate::{CacheBackend, CachetConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Startup continues; the issue is logged.
    Warning,
    /// Startup is refused.
    Error,
}

/// One finding about a single configuration key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub severity: Severity,
    /// Dotted key as written in `cachet.toml`, e.g. `server.port`.
    pub key: &'static str,
    pub message: String,
}

impl Issue {
    /// Environment variable that sets [`Issue::key`].
    pub fn env_var(&self) -> String {
        format!("CACHET_{}", self.key.to_ascii_uppercase().replace('.', "__"))
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} (env {})", self.key, self.message, self.env_var())
    }
}

/// Every issue found in a loaded configuration, in check order.
#[derive(Debug, Default)]
pub struct ConfigReport {
    issues: Vec<Issue>,
}

impl ConfigReport {
    pub fn is_ok(&self) -> bool {
        !self.has_errors()
    }

    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Issue> {
        self.with_severity(Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Issue> {
        self.with_severity(Severity::Warning)
    }

    fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(move |i| i.severity == severity)
    }

    fn push(&mut self, severity: Severity, key: &'static str, message: impl Into<String>) {
        self.issues.push(Issue {
            severity,
            key,
            message: message.into(),
        });
    }

    fn error(&mut self, key: &'static str, message: impl Into<String>) {
        self.push(Severity::Error, key, message);
    }

    fn warn(&mut self, key: &'static str, message: impl Into<String>) {
        self.push(Severity::Warning, key, message);
    }
}

/// One line per error; warnings are logged separately by the loader.
impl fmt::Display for ConfigReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for issue in self.errors() {
            writeln!(f, "  - {issue}")?;
        }
        Ok(())
    }
}

/// Validate a configuration and return a report of issues.
pub fn validate(cfg: &CachetConfig) -> ConfigReport {
    let mut report = ConfigReport::default();

    validate_server(cfg, &mut report);
    validate_origin(cfg, &mut report);
    validate_cache(cfg, &mut report);
    validate_limit(cfg, &mut report);

    report
}

fn validate_server(cfg: &CachetConfig, report: &mut ConfigReport) {
    match cfg.server.port {
        None => report.error("server.port", "is required (1-65535)"),
        Some(0) => report.error("server.port", "must be between 1 and 65535"),
        Some(_) => {}
    }

    if cfg.server.bind.trim().is_empty() {
        report.error("server.bind", "is empty");
    }

    if cfg.server.max_connections == 0 {
        report.error("server.max_connections", "must be greater than 0");
    }

    if cfg.server.client_read_timeout_secs == 0 {
        report.error("server.client_read_timeout_secs", "must be greater than 0");
    }

    if cfg.server.shutdown_grace_secs == 0 {
        report.warn("server.shutdown_grace_secs", "is 0; in-flight requests are cut on shutdown");
    }
}

fn validate_origin(cfg: &CachetConfig, report: &mut ConfigReport) {
    let Some(raw) = cfg.origin.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) else {
        report.error("origin.url", "is required");
        return;
    };

    match Url::parse(raw) {
        Ok(url) => {
            if url.scheme() != "http" {
                report.error(
                    "origin.url",
                    format!("'{raw}' must use http:// (TLS to the origin is not supported)"),
                );
            }
            if url.host_str().is_none() {
                report.error("origin.url", format!("'{raw}' has no host"));
            }
            if cfg.origin.forward_path && url.query().is_some() {
                report.warn(
                    "origin.url",
                    format!("'{raw}' has a query string; it is replaced when forward_path is on"),
                );
            }
        }
        Err(e) => report.error("origin.url", format!("'{raw}' is not a valid URL: {e}")),
    }

    if cfg.origin.request_timeout_secs == 0 {
        report.error("origin.request_timeout_secs", "must be greater than 0");
    }
    if cfg.origin.connect_timeout_secs == 0 {
        report.error("origin.connect_timeout_secs", "must be greater than 0");
    }
    if cfg.origin.max_response_body_bytes == 0 {
        report.error("origin.max_response_body_bytes", "must be greater than 0");
    }
}

fn validate_cache(cfg: &CachetConfig, report: &mut ConfigReport) {
    let cache = &cfg.cache;

    match cache.backend {
        CacheBackend::Redis => {
            if cache.host.trim().is_empty() {
                report.error("cache.host", "is required (or set REDIS_URL)");
            }
            if cache.port == 0 {
                report.error("cache.port", "must be between 1 and 65535");
            }
            if cache.pool_size == 0 {
                report.error("cache.pool_size", "must be greater than 0");
            }
        }
        CacheBackend::Memory => {
            report.warn("cache.backend", "is 'memory'; cached responses are lost on restart");
        }
    }

    if cache.default_ttl_secs == 0 {
        report.error("cache.default_ttl_secs", "must be greater than 0");
    }
    if cache.op_timeout_ms == 0 {
        report.error("cache.op_timeout_ms", "must be greater than 0");
    }
}

fn validate_limit(cfg: &CachetConfig, report: &mut ConfigReport) {
    let limit = &cfg.limit;

    if limit.capacity == 0 {
        report.error("limit.capacity", "must be greater than 0");
    }
    if limit.refill_interval_ms == 0 {
        report.error("limit.refill_interval_ms", "must be greater than 0");
    }
    if limit.refill_rate == 0 {
        report.warn("limit.refill_rate", "is 0; the bucket never refills after draining");
    }
    if limit.refill_rate > limit.capacity {
        report.warn(
            "limit.refill_rate",
            format!(
                "({}) exceeds limit.capacity ({}); each refill is clamped",
                limit.refill_rate, limit.capacity
            ),
        );
    }
}
