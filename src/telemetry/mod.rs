//! Telemetry: logging setup and per-queue packet counters.

mod logging;
mod metrics;

pub use logging::{init_logging, LogConfig};
pub use metrics::{Counter, MetricsRegistry, QueueStats};
