/// Failures of the cache store adapter.
///
/// A missing key is not an error; see [`crate::Lookup::NotFound`].
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Connection failure, timeout or protocol error talking to the store.
    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    /// Contract violation by the caller (empty key, empty payload).
    #[error("invalid cache input: {0}")]
    InvalidInput(&'static str),
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::Unavailable(e.to_string())
    }
}

impl From<deadpool_redis::PoolError> for CacheError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        CacheError::Unavailable(format!("pool: {e}"))
    }
}

impl From<tokio::time::error::Elapsed> for CacheError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        CacheError::Unavailable("operation timed out".into())
    }
}
