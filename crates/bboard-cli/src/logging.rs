//! Logging and tracing setup for the bboard binary
//!
//! Console output is always on. A daily-rolling JSON file can be added for
//! production, where the console is usually captured by the process manager.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::settings::LogSettings;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory where JSON log files are written
    pub log_dir: PathBuf,

    /// Whether to write JSON logs to files
    pub enable_json_logs: bool,

    /// Whether to include file/line information in console logs
    pub include_location: bool,

    /// Whether to log span open/close (instrumented pool and factory calls)
    pub enable_spans: bool,

    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: log_directory(),
            enable_json_logs: false,
            include_location: cfg!(debug_assertions),
            enable_spans: false,
            default_filter: LogSettings::default().filter,
        }
    }
}

impl LoggingConfig {
    /// Build the configuration from the `[logging]` section; `verbose`
    /// raises the default filter to debug and logs spans
    pub fn from_settings(settings: &LogSettings, verbose: bool) -> Self {
        let default_filter = if verbose {
            "debug,bboard_connection=trace,bboard_driver_mysql=debug".to_string()
        } else {
            settings.filter.clone()
        };
        Self {
            log_dir: settings.dir.clone().unwrap_or_else(log_directory),
            enable_json_logs: settings.json_file,
            enable_spans: verbose,
            default_filter,
            ..Self::default()
        }
    }
}

/// Initialize the logging system with the given configuration.
///
/// The returned guard flushes the JSON file writer; keep it alive until the
/// process exits.
pub fn init(config: LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    // RUST_LOG takes precedence over the configured filter
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let mut layers = Vec::new();

    let console_layer = fmt::layer()
        .with_target(true)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_span_events(span_events.clone())
        .with_writer(std::io::stderr)
        .with_filter(env_filter.clone())
        .boxed();
    layers.push(console_layer);

    let mut guard = None;
    if config.enable_json_logs {
        std::fs::create_dir_all(&config.log_dir)?;
        let file_appender = tracing_appender::rolling::daily(&config.log_dir, "bboard.log");
        let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(worker_guard);

        let json_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(span_events)
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(non_blocking)
            .with_filter(env_filter)
            .boxed();
        layers.push(json_layer);
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    tracing::debug!(
        log_dir = %config.log_dir.display(),
        json_enabled = config.enable_json_logs,
        "logging initialized"
    );

    Ok(guard)
}

/// `<data dir>/bboard/logs`
pub fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bboard")
        .join("logs")
}
