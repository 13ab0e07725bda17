use std::time::{Duration, Instant};

use bytes::Bytes;

/// Raw response bytes plus their expiration, as held by the in-memory store.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub body: Bytes,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl CachedEntry {
    pub fn new(body: Bytes, ttl: Duration) -> Self {
        Self {
            body,
            created_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.created_at.elapsed() > self.ttl
    }
}
