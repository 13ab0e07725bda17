use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tracing::{debug, Span};

use crate::{entry::CachedEntry, error::CacheError};

/// Expiration applied when `set` is called without an explicit TTL.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Outcome of a successful store read. Store failures are never folded in
/// here; they come back as [`CacheError::Unavailable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(Bytes),
    NotFound,
}

impl Lookup {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

/// Narrow get/set interface to the backing key/value store.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Lookup, CacheError>;

    /// Stores `body` under `key`. `ttl = None` means [`DEFAULT_TTL`].
    async fn set(&self, key: &str, body: Bytes, ttl: Option<Duration>) -> Result<(), CacheError>;
}

pub(crate) fn check_key(key: &str) -> Result<(), CacheError> {
    if key.is_empty() {
        return Err(CacheError::InvalidInput("key cannot be empty"));
    }
    Ok(())
}

pub(crate) fn check_payload(body: &Bytes) -> Result<(), CacheError> {
    if body.is_empty() {
        return Err(CacheError::InvalidInput("refusing to cache an empty payload"));
    }
    Ok(())
}

/// In-process store with per-entry expiry. Used by tests and `--memory-cache`.
#[derive(Debug)]
pub struct MemoryCacheStore {
    inner: DashMap<String, CachedEntry>,
    log: Span,
}

impl MemoryCacheStore {
    pub fn new(log: Span) -> Self {
        Self {
            inner: DashMap::new(),
            log,
        }
    }

    /// Current entry for `key`, expired or not.
    pub fn peek(&self, key: &str) -> Option<CachedEntry> {
        self.inner.get(key).map(|e| e.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new(Span::none())
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Lookup, CacheError> {
        check_key(key)?;

        let Some(entry) = self.inner.get(key).map(|e| e.clone()) else {
            return Ok(Lookup::NotFound);
        };

        if entry.is_expired() {
            self.inner.remove(key);
            debug!(target: "cachet::cache", parent: &self.log, %key, "Dropped expired entry");
            return Ok(Lookup::NotFound);
        }

        Ok(Lookup::Found(entry.body))
    }

    async fn set(&self, key: &str, body: Bytes, ttl: Option<Duration>) -> Result<(), CacheError> {
        check_key(key)?;
        check_payload(&body)?;

        let ttl = ttl.unwrap_or(DEFAULT_TTL);
        self.inner.insert(key.to_string(), CachedEntry::new(body, ttl));
        Ok(())
    }
}
