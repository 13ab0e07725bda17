use std::path::PathBuf;

use anyhow::Context;
use cachet_config::{CachetConfig, ConfigSources, Overrides, DEFAULT_CONFIG_FILE};
use cachet_core::{build_pipeline, connect_store, Master, TokenBucket};
use clap::Parser;
use tracing::{info, info_span};
use utils::init_tracing;

/// Caching reverse proxy: one origin, one cache, token-bucket admission.
#[derive(Debug, Parser)]
#[command(name = "cachet", version, about)]
struct Cli {
    /// TOML configuration file. A missing file is not an error.
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Port to listen on.
    #[arg(short, long)]
    port: Option<u16>,

    /// Origin URL every miss is forwarded to.
    #[arg(long, visible_alias = "redirect-url")]
    origin: Option<String>,

    /// Append the inbound path and query to the origin URL.
    #[arg(long)]
    forward_path: bool,

    /// Use the in-process cache instead of Redis.
    #[arg(long)]
    memory_cache: bool,

    /// Log filter used when RUST_LOG is not set.
    #[arg(long, env = "CACHET_LOG")]
    log_level: Option<String>,
}

impl Cli {
    fn sources(&self) -> ConfigSources {
        ConfigSources {
            file: Some(self.config.clone()),
            env: None,
            overrides: Overrides {
                port: self.port,
                origin: self.origin.clone(),
                forward_path: self.forward_path.then_some(true),
                memory_cache: self.memory_cache,
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let cfg = CachetConfig::load(&cli.sources())
        .with_context(|| format!("loading {}", cli.config.display()))?;
    cfg.log_summary();

    let store = connect_store(&cfg).await?;

    let (bucket, refill) = TokenBucket::spawn(
        cfg.limit.capacity,
        cfg.limit.refill_rate,
        cfg.limit.refill_interval(),
        info_span!("admission"),
    );

    let pipeline = build_pipeline(&cfg, bucket, store)?;
    let served = Master::new(cfg, pipeline).run(shutdown_signal()).await;

    refill.stop().await;
    served?;

    info!(target: "cachet::master", "Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(target: "cachet::master", error = ?e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(target: "cachet::master", error = ?e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!(target: "cachet::master", "Ctrl+C received"),
        _ = terminate => info!(target: "cachet::master", "SIGTERM received"),
    }
}
