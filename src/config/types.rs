//! Configuration types

use crate::queue::{CopyMode, QueueConfig};
use crate::telemetry::LogConfig;
use serde::Deserialize;
use std::time::Duration;

/// User-defined configuration (config.toml)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// One `[[queue]]` section per queue to bind.
    #[serde(default)]
    pub queue: Vec<QueueSection>,
    #[serde(default)]
    pub inspect: InspectSection,
    #[serde(default)]
    pub log: LogSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueSection {
    /// Queue number the firewall ruleset diverts packets to.
    pub num: u16,
    pub max_packet_len: Option<u32>,
    pub max_queue_len: Option<u32>,
    #[serde(default)]
    pub copy_mode: CopyModeSetting,
    pub read_timeout_ms: Option<u64>,
    pub write_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyModeSetting {
    Meta,
    #[default]
    Packet,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InspectSection {
    /// Payload bytes shown per packet in log summaries.
    #[serde(default = "default_payload_preview")]
    pub payload_preview: usize,
}

impl Default for InspectSection {
    fn default() -> Self {
        Self {
            payload_preview: default_payload_preview(),
        }
    }
}

fn default_payload_preview() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl QueueSection {
    /// Fills unspecified fields with runtime defaults.
    pub fn to_queue_config(&self) -> QueueConfig {
        let defaults = QueueConfig::default();
        QueueConfig {
            queue_num: self.num,
            max_packet_len: self.max_packet_len.unwrap_or(defaults.max_packet_len),
            max_queue_len: self.max_queue_len.unwrap_or(defaults.max_queue_len),
            copy_mode: match self.copy_mode {
                CopyModeSetting::Meta => CopyMode::Meta,
                CopyModeSetting::Packet => CopyMode::Packet,
            },
            read_timeout: self
                .read_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.read_timeout),
            write_timeout: self
                .write_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.write_timeout),
        }
    }
}

impl LogSection {
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            level: self.level.clone(),
            format: self.format.clone(),
        }
    }
}
