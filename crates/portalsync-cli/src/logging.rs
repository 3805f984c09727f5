use tracing_subscriber::EnvFilter;

/// Env var that overrides `--log-level` with a full filter directive.
const LOG_ENV: &str = "PORTALSYNC_LOG";

/// Initialize structured logging on stderr; stdout carries the batch summary.
///
/// `PORTALSYNC_LOG` wins over `RUST_LOG`, which wins over `log_level`.
pub fn init(log_level: &str) {
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
