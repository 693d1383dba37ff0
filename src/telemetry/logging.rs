//! Logging configuration and initialization.
//!
//! Supports RUST_LOG, config.toml settings, and three output formats
//! (pretty, compact, json).

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Logging configuration from config.toml.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,
    /// Output format: pretty, compact, json
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Initializes the logging system.
///
/// Priority:
/// 1. RUST_LOG environment variable (if set)
/// 2. config parameter (if provided)
/// 3. Default: info level, pretty format
pub fn init_logging(config: Option<&LogConfig>) {
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        // RUST_LOG takes priority
        EnvFilter::from_default_env()
    } else if let Some(cfg) = config {
        let level = parse_level(&cfg.level);
        EnvFilter::new(level.as_str())
    } else {
        EnvFilter::new("info")
    };

    let format = config.map(|c| c.format.as_str()).unwrap_or("pretty");

    match format {
        "json" => {
            let subscriber = tracing_subscriber::registry().with(env_filter).with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE),
            );
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
        "compact" => {
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().compact());
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
        _ => {
            // "pretty" or default
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer());
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
    }
}

/// Parses a log level string into a Level.
fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    }
}
