use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_FILTER: &str = "info,cachet=debug,cachet_core=debug,cachet_proxy=debug,cachet_cache=debug";

/// Installs the global subscriber. `RUST_LOG` wins; otherwise `level`
/// (e.g. `warn` or `cachet=trace`) is used, falling back to the default filter.
pub fn init_tracing(level: Option<&str>) {
    let env_filter = EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| level.and_then(|l| EnvFilter::try_new(l).ok()))
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(true)
                .with_thread_ids(false),
        )
        .init();
}
