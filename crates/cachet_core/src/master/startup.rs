use std::{sync::Arc, time::Duration};

use anyhow::Context;
use cachet_cache::{CacheStore, MemoryCacheStore, RedisCacheStore, RedisSettings};
use cachet_config::{CacheBackend, CachetConfig};
use cachet_proxy::{Origin, OriginSettings};
use tokio::sync::Semaphore;
use tracing::{info, info_span};

use super::Master;
use crate::admission::TokenBucket;
use crate::pipeline::{Pipeline, PipelineSettings};

impl Master {
    pub(super) fn log_startup(&self) {
        info!(target: "cachet::master", "Starting CACHET MASTER");
        info!(
            target: "cachet::master",
            origin = self.cfg.origin.url.as_deref().unwrap_or("<unset>"),
            forward_path = self.cfg.origin.forward_path,
            backend = ?self.cfg.cache.backend,
            coalesce_misses = self.cfg.cache.coalesce_misses,
            "Proxy configuration loaded"
        );
    }

    pub(super) fn init_semaphore(&self) -> Arc<Semaphore> {
        let max_conns = self.cfg.server.max_connections;
        let semaphore = Arc::new(Semaphore::new(max_conns));
        info!(
            target: "cachet::master",
            max_conns,
            "Global connection semaphore initialized"
        );
        semaphore
    }
}

/// Opens the configured cache store. A Redis store that cannot be reached
/// at startup is an error.
pub async fn connect_store(cfg: &CachetConfig) -> anyhow::Result<Arc<dyn CacheStore>> {
    let cache = &cfg.cache;

    match cache.backend {
        CacheBackend::Memory => {
            info!(target: "cachet::cache", "Using in-memory cache store");
            Ok(Arc::new(MemoryCacheStore::new(info_span!("cache", backend = "memory"))))
        }
        CacheBackend::Redis => {
            let settings = RedisSettings {
                host: cache.host.clone(),
                port: cache.port,
                password: cache.password.clone(),
                database: cache.database,
                pool_size: cache.pool_size,
                op_timeout: cache.op_timeout(),
            };
            let log = info_span!("cache", backend = "redis", addr = %settings.display_addr());

            let store = RedisCacheStore::connect(&settings, log)
                .await
                .with_context(|| format!("cannot connect to redis at {}", settings.display_addr()))?;
            Ok(Arc::new(store))
        }
    }
}

/// Wires the origin forwarder, the bucket and the store into a [`Pipeline`].
pub fn build_pipeline(
    cfg: &CachetConfig,
    bucket: Arc<TokenBucket>,
    store: Arc<dyn CacheStore>,
) -> anyhow::Result<Pipeline> {
    let origin_cfg = &cfg.origin;
    let url = origin_cfg
        .url
        .clone()
        .context("origin.url is not configured")?;

    let settings = OriginSettings {
        url,
        forward_path: origin_cfg.forward_path,
        connect_timeout: Duration::from_secs(origin_cfg.connect_timeout_secs),
        request_timeout: Duration::from_secs(origin_cfg.request_timeout_secs),
        max_response_body_bytes: usize::try_from(origin_cfg.max_response_body_bytes)
            .unwrap_or(usize::MAX),
    };
    let origin = Origin::new(&settings, info_span!("origin", url = %settings.url))
        .context("invalid origin")?;

    let pipeline_settings = PipelineSettings {
        default_ttl: cfg.cache.default_ttl(),
        max_request_body_bytes: usize::try_from(cfg.server.max_request_body_bytes)
            .unwrap_or(usize::MAX),
        body_read_timeout: cfg.server.client_read_timeout(),
        coalesce_misses: cfg.cache.coalesce_misses,
    };

    Ok(Pipeline::new(
        bucket,
        store,
        origin,
        pipeline_settings,
        info_span!("pipeline"),
    ))
}
