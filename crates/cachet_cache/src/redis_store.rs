use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use deadpool_redis::{Pool, PoolConfig, Runtime, Timeouts};
use redis::AsyncCommands;
use tokio::time::timeout;
use tracing::{debug, info, Span};
use url::Url;

use crate::{
    error::CacheError,
    store::{check_key, check_payload, CacheStore, Lookup, DEFAULT_TTL},
};

/// Where and how to reach the Redis instance.
#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub database: u32,
    pub pool_size: usize,
    /// Upper bound for every store round-trip, pool checkout included.
    pub op_timeout: Duration,
}

impl RedisSettings {
    /// `redis://[:password@]host:port/db`, password percent-encoded.
    pub fn connection_url(&self) -> Result<Url, CacheError> {
        let base = format!("redis://{}:{}/{}", self.host, self.port, self.database);
        let mut url = Url::parse(&base)
            .map_err(|_| CacheError::InvalidInput("invalid redis host or port"))?;

        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            url.set_password(Some(password))
                .map_err(|_| CacheError::InvalidInput("redis url cannot carry a password"))?;
        }

        Ok(url)
    }

    /// Same as [`connection_url`](Self::connection_url) without the secret,
    /// for logs.
    pub fn display_addr(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

/// Cache store backed by Redis (`GET key`, `SET key value EX ttl`).
pub struct RedisCacheStore {
    pool: Pool,
    op_timeout: Duration,
    log: Span,
}

impl RedisCacheStore {
    /// Builds the pool and PINGs the server once; an unreachable store is an
    /// error here so startup can abort.
    pub async fn connect(settings: &RedisSettings, log: Span) -> Result<Self, CacheError> {
        let url = settings.connection_url()?;

        let mut timeouts = Timeouts::default();
        timeouts.wait = Some(settings.op_timeout);
        timeouts.create = Some(settings.op_timeout);
        timeouts.recycle = Some(settings.op_timeout);
        let mut pool_cfg = PoolConfig::new(settings.pool_size.max(1));
        pool_cfg.timeouts = timeouts;

        let mut cfg = deadpool_redis::Config::from_url(url.as_str());
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::Unavailable(format!("cannot create pool: {e}")))?;

        info!(
            target: "cachet::cache",
            parent: &log,
            addr = %settings.display_addr(),
            pool_size = settings.pool_size,
            "Connecting to Redis"
        );

        let store = Self {
            pool,
            op_timeout: settings.op_timeout,
            log,
        };
        store.ping().await?;

        info!(target: "cachet::cache", parent: &store.log, "Connected to Redis");
        Ok(store)
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        timeout(self.op_timeout, async {
            let mut conn = self.pool.get().await?;
            let _pong: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, CacheError>(())
        })
        .await?
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Lookup, CacheError> {
        check_key(key)?;

        let value: Option<Vec<u8>> = timeout(self.op_timeout, async {
            let mut conn = self.pool.get().await?;
            let value: Option<Vec<u8>> = conn.get(key).await?;
            Ok::<_, CacheError>(value)
        })
        .await??;

        let lookup = match value {
            Some(bytes) => Lookup::Found(Bytes::from(bytes)),
            None => Lookup::NotFound,
        };
        debug!(target: "cachet::cache", parent: &self.log, %key, found = lookup.is_found(), "GET");
        Ok(lookup)
    }

    async fn set(&self, key: &str, body: Bytes, ttl: Option<Duration>) -> Result<(), CacheError> {
        check_key(key)?;
        check_payload(&body)?;

        // EX takes whole seconds; sub-second TTLs round up to one.
        let ttl_secs = ttl.unwrap_or(DEFAULT_TTL).as_secs().max(1);

        timeout(self.op_timeout, async {
            let mut conn = self.pool.get().await?;
            conn.set_ex::<_, _, ()>(key, body.as_ref(), ttl_secs).await?;
            Ok::<_, CacheError>(())
        })
        .await??;

        debug!(target: "cachet::cache", parent: &self.log, %key, ttl_secs, bytes = body.len(), "SET");
        Ok(())
    }
}
