//! Request fingerprinting and the cache store adapters.

pub mod entry;
pub mod error;
pub mod key;
pub mod redis_store;
pub mod store;

pub use entry::CachedEntry;
pub use error::CacheError;
pub use key::CacheKey;
pub use redis_store::{RedisCacheStore, RedisSettings};
pub use store::{CacheStore, Lookup, MemoryCacheStore, DEFAULT_TTL};
