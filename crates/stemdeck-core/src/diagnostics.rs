use std::{fs, path::Path};

use anyhow::Context;
use chrono::Utc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

pub const DEFAULT_LOG_FILTER: &str = "info,stemdeck_core=trace,stemdeck_app=trace";
pub const DEFAULT_TRACE_FILE_PREFIX: &str = "stemdeck";

#[derive(Debug, Clone)]
pub struct TracingOptions {
    pub file_prefix: String,
    pub default_filter: String,
}

impl Default for TracingOptions {
    fn default() -> Self {
        Self {
            file_prefix: DEFAULT_TRACE_FILE_PREFIX.to_string(),
            default_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// Keeps the file writer flushing; drop it at shutdown.
pub struct TelemetryGuard {
    pub session_id: Uuid,
    _file_guard: WorkerGuard,
}

pub fn init_tracing(log_dir: impl AsRef<Path>) -> anyhow::Result<TelemetryGuard> {
    init_tracing_with_options(log_dir, &TracingOptions::default())
}

/// Compact stderr plus a JSON file per run under `log_dir`. `RUST_LOG`
/// overrides the default filter. A second initialisation only warns.
pub fn init_tracing_with_options(
    log_dir: impl AsRef<Path>,
    options: &TracingOptions,
) -> anyhow::Result<TelemetryGuard> {
    let log_dir = log_dir.as_ref();
    fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory: {}", log_dir.display()))?;

    let session_id = Uuid::new_v4();
    let timestamp = Utc::now().format("%Y%m%d-%H%M%S");
    let file_name = format!("{}-{timestamp}.log", options.file_prefix);
    let (file_writer, file_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(log_dir, file_name));

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&options.default_filter));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(true)
        .with_writer(std::io::stderr);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(file_writer);

    match tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
    {
        Ok(()) => info!(%session_id, log_dir = %log_dir.display(), "tracing initialized"),
        Err(error) => warn!(?error, "global tracing subscriber already initialized"),
    }

    Ok(TelemetryGuard {
        session_id,
        _file_guard: file_guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_initialisation_is_not_an_error() {
        let temp = tempfile::tempdir().expect("tempdir should be creatable");
        let options = TracingOptions {
            file_prefix: "stemdeck-test".to_string(),
            ..TracingOptions::default()
        };
        let first = init_tracing_with_options(temp.path(), &options).expect("first init");
        let second = init_tracing_with_options(temp.path(), &options).expect("second init");
        assert_ne!(first.session_id, second.session_id);
    }
}
