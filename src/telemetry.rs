//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins over the configured filter. When `logging.log_dir` is set,
//! events are also written to a daily-rotated `newhire.log` in that directory.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingSection;

/// Build the env filter, preferring `RUST_LOG` over the configured directive string.
pub fn build_filter(config: &LoggingSection) -> Result<EnvFilter> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(directives)
            .context("Invalid RUST_LOG directives"),
        _ => EnvFilter::try_new(&config.filter)
            .with_context(|| format!("Invalid logging.filter '{}'", config.filter)),
    }
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process so buffered file output is flushed on exit.
pub fn init_tracing(config: &LoggingSection) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(config)?;

    let stdout_layer = if config.json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "newhire.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
