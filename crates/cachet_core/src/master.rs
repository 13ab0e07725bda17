use std::{future::Future, sync::Arc, time::Duration};

use cachet_config::CachetConfig;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tracing::{error, info, instrument, warn};

use crate::pipeline::Pipeline;
use crate::worker::spawn_connection;

mod accept;
mod startup;

pub use startup::{build_pipeline, connect_store};

use accept::{accept_with_permit, bind_listener};

pub struct Master {
    cfg: Arc<CachetConfig>,
    pipeline: Arc<Pipeline>,
}

impl Master {
    pub fn new(cfg: CachetConfig, pipeline: Pipeline) -> Self {
        Self {
            cfg: Arc::new(cfg),
            pipeline: Arc::new(pipeline),
        }
    }

    /// Binds the configured listen address and serves until `shutdown`
    /// resolves.
    pub async fn run<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let listen_addr = self
            .cfg
            .server
            .listen_addr()
            .ok_or_else(|| anyhow::anyhow!("server.port is not configured"))?;

        let listener = bind_listener(&listen_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Accept loop over an already bound listener.
    ///
    /// When `shutdown` resolves the listener is closed, in-flight connections
    /// get `server.shutdown_grace_secs` to finish, and whatever is left is
    /// abandoned.
    #[instrument(
        skip_all,
        fields(
            listen = ?listener.local_addr().ok(),
            max_connections = self.cfg.server.max_connections,
        )
    )]
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        self.log_startup();

        let semaphore = self.init_semaphore();
        let graceful = GracefulShutdown::new();
        tokio::pin!(shutdown);

        info!(
            target: "cachet::master",
            "Master initialized. Waiting for incoming connections (Ctrl+C to stop)..."
        );

        loop {
            tokio::select! {
                accepted = accept_with_permit(&listener, &semaphore) => {
                    match accepted {
                        Ok(conn) => spawn_connection(
                            conn.stream,
                            conn.addr,
                            conn.permit,
                            self.pipeline.clone(),
                            &graceful,
                            self.cfg.server.client_read_timeout(),
                        ),
                        Err(e) => {
                            error!(target: "cachet::master", error = ?e, "Accept failed");
                            tokio::time::sleep(Duration::from_millis(50)).await;
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!(target: "cachet::master", "Shutdown requested; no longer accepting");
                    break;
                }
            }
        }

        drop(listener);

        let grace = Duration::from_secs(self.cfg.server.shutdown_grace_secs);
        tokio::select! {
            _ = graceful.shutdown() => {
                info!(target: "cachet::master", "All connections closed");
            }
            _ = tokio::time::sleep(grace) => {
                warn!(
                    target: "cachet::master",
                    grace_secs = grace.as_secs(),
                    "Grace period elapsed; abandoning remaining connections"
                );
            }
        }

        Ok(())
    }
}
