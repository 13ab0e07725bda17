//! Per-request orchestration: admission → fingerprint → cache read →
//! (miss) forward + cache write → response.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use cachet_cache::{CacheKey, CacheStore, Lookup};
use cachet_http::responses::{body_200, send_400, send_429, send_500, CacheStatus, HttpResponse};
use cachet_http::ProxyRequest;
use cachet_proxy::Origin;
use http::Request;
use http_body_util::{BodyExt, Limited};
use hyper::body::Body;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn, Span};

use crate::admission::TokenBucket;
use crate::coalesce::KeyLocks;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// TTL attached to every cache write.
    pub default_ttl: Duration,
    pub max_request_body_bytes: usize,
    /// Deadline for receiving the whole inbound body.
    pub body_read_timeout: Duration,
    /// Serialize concurrent misses on the same key.
    pub coalesce_misses: bool,
}

pub struct Pipeline {
    bucket: Arc<TokenBucket>,
    store: Arc<dyn CacheStore>,
    origin: Origin,
    settings: PipelineSettings,
    inflight: KeyLocks,
    log: Span,
}

impl Pipeline {
    pub fn new(
        bucket: Arc<TokenBucket>,
        store: Arc<dyn CacheStore>,
        origin: Origin,
        settings: PipelineSettings,
        log: Span,
    ) -> Self {
        Self {
            bucket,
            store,
            origin,
            settings,
            inflight: KeyLocks::default(),
            log,
        }
    }

    pub fn bucket(&self) -> &Arc<TokenBucket> {
        &self.bucket
    }

    /// Handles one inbound request end to end. Every failure is turned into a
    /// status code here; nothing propagates to the connection.
    #[instrument(
        name = "request",
        parent = &self.log,
        skip_all,
        fields(method = %req.method(), path = %req.uri().path())
    )]
    pub async fn handle<B>(&self, req: Request<B>) -> HttpResponse
    where
        B: Body<Data = Bytes> + Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if !self.bucket.take_token().is_admitted() {
            debug!(target: "cachet::pipeline", "Admission denied");
            return send_429();
        }

        let (parts, body) = req.into_parts();
        let key = CacheKey::from_request(&parts.method, &parts.uri);
        let store_key = key.to_hex();

        match self.read_cache(&store_key).await {
            Ok(Some(bytes)) => return body_200(bytes, CacheStatus::Hit),
            Ok(None) => {}
            Err(res) => return res,
        }

        let _miss_guard = if self.settings.coalesce_misses {
            let guard = self.inflight.acquire(key).await;
            // Someone may have filled the entry while we waited.
            match self.read_cache(&store_key).await {
                Ok(Some(bytes)) => return body_200(bytes, CacheStatus::Hit),
                Ok(None) => {}
                Err(res) => return res,
            }
            Some(guard)
        } else {
            None
        };

        debug!(target: "cachet::pipeline", key = %store_key, "Cache miss; forwarding to origin");

        let body = match self.read_body(body).await {
            Some(body) => body,
            None => return send_400(),
        };

        let fetched = match self.origin.forward(ProxyRequest::from_parts(parts, body)).await {
            Ok(res) => res,
            Err(e) => {
                error!(target: "cachet::pipeline", error = %e, "Origin fetch failed");
                return send_500();
            }
        };

        self.populate(&store_key, fetched.body.clone()).await;

        info!(
            target: "cachet::pipeline",
            origin_status = fetched.status.as_u16(),
            bytes = fetched.body.len(),
            "Served from origin"
        );
        body_200(fetched.body, CacheStatus::Miss)
    }

    /// Buffers the inbound body within the size cap and the read deadline.
    async fn read_body<B>(&self, body: B) -> Option<Bytes>
    where
        B: Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let limited = Limited::new(body, self.settings.max_request_body_bytes);
        match timeout(self.settings.body_read_timeout, limited.collect()).await {
            Ok(Ok(collected)) => Some(collected.to_bytes()),
            Ok(Err(e)) => {
                warn!(target: "cachet::pipeline", error = %e, "Failed to read request body");
                None
            }
            Err(_) => {
                warn!(
                    target: "cachet::pipeline",
                    timeout_ms = self.settings.body_read_timeout.as_millis() as u64,
                    "Timed out reading request body"
                );
                None
            }
        }
    }

    /// `Ok(Some)` on a usable hit, `Ok(None)` on a miss, `Err(500)` when the
    /// store cannot answer.
    async fn read_cache(&self, store_key: &str) -> Result<Option<Bytes>, HttpResponse> {
        match self.store.get(store_key).await {
            Ok(Lookup::Found(bytes)) if !bytes.is_empty() => {
                debug!(target: "cachet::pipeline", key = %store_key, bytes = bytes.len(), "Cache hit");
                Ok(Some(bytes))
            }
            Ok(_) => Ok(None),
            Err(e) => {
                error!(target: "cachet::pipeline", key = %store_key, error = %e, "Cache read failed");
                Err(send_500())
            }
        }
    }

    /// Cache write after a successful fetch. Failures are logged only.
    async fn populate(&self, store_key: &str, body: Bytes) {
        if body.is_empty() {
            debug!(target: "cachet::pipeline", key = %store_key, "Empty origin body; not cached");
            return;
        }

        if let Err(e) = self
            .store
            .set(store_key, body, Some(self.settings.default_ttl))
            .await
        {
            warn!(target: "cachet::pipeline", key = %store_key, error = %e, "Cache write failed");
        }
    }
}
