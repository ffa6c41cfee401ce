use std::env;
use tracing::Level;
use tracing_subscriber::{filter::Targets, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/**
 * Sets `RUST_BACKTRACE=1` unless the user already chose a value,
 * so a panic always comes with a stacktrace.
 */
pub(crate) fn set_full_stacktrace_as_default() {
    let key = "RUST_BACKTRACE";
    if env::var(key).is_ok() {
        return;
    }
    env::set_var(key, "1");
}

pub(crate) fn enable_logging(verbose: bool) {
    let value = env::var("RUST_LOG").unwrap_or_default();

    if !value.is_empty() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
        tracing::info!("Used RUST_LOG={} env variable to set logging output.", value);
        if verbose {
            tracing::warn!("RUST_LOG= is set. Ignore --verbose flag.")
        }
        return;
    }

    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = Targets::new()
        .with_target("dotrelay", level)
        .with_target("rustls", Level::WARN);

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    if verbose {
        tracing::info!("Verbose mode enabled.");
    }
}

/// Blocks until Ctrl-C is received.
pub(crate) async fn wait_on_ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Unable to listen for shutdown signal Ctrl+C: {err}");
    }
}
