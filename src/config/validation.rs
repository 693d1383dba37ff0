//! Configuration validation

use super::Config;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_queues(config, &mut result);
    validate_inspect(config, &mut result);
    validate_log(config, &mut result);

    result
}

fn validate_queues(config: &Config, result: &mut ValidationResult) {
    if config.queue.is_empty() {
        result.error("no [[queue]] sections defined, nothing to bind");
    }

    let mut seen = HashSet::new();
    for section in &config.queue {
        if !seen.insert(section.num) {
            result.error(format!("queue.{}: duplicate queue number", section.num));
        }

        if let Some(len) = section.max_packet_len {
            if len == 0 {
                result.error(format!("queue.{}: max_packet_len must be non-zero", section.num));
            } else if len > 0xFFFF {
                result.error(format!(
                    "queue.{}: max_packet_len {} exceeds 65535",
                    section.num, len
                ));
            }
        }

        if section.max_queue_len == Some(0) {
            result.error(format!("queue.{}: max_queue_len must be non-zero", section.num));
        }

        if section.read_timeout_ms == Some(0) {
            result.error(format!("queue.{}: read_timeout_ms must be non-zero", section.num));
        }
        if section.write_timeout_ms == Some(0) {
            result.error(format!("queue.{}: write_timeout_ms must be non-zero", section.num));
        }

        if section.read_timeout_ms.map_or(false, |ms| ms > 1000) {
            result.warn(format!(
                "queue.{}: read_timeout_ms over 1s delays shutdown responsiveness",
                section.num
            ));
        }
    }
}

fn validate_inspect(config: &Config, result: &mut ValidationResult) {
    if config.inspect.payload_preview > 4096 {
        result.warn(format!(
            "inspect: payload_preview {} is unusually large",
            config.inspect.payload_preview
        ));
    }
}

fn validate_log(config: &Config, result: &mut ValidationResult) {
    const LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    const FORMATS: [&str; 3] = ["pretty", "compact", "json"];

    if !LEVELS.contains(&config.log.level.to_lowercase().as_str()) {
        result.warn(format!(
            "log: unknown level '{}', falling back to info",
            config.log.level
        ));
    }
    if !FORMATS.contains(&config.log.format.as_str()) {
        result.warn(format!(
            "log: unknown format '{}', falling back to pretty",
            config.log.format
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Config {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn valid_config_passes() {
        let config = parse(
            r#"
            [[queue]]
            num = 101
        "#,
        );
        let result = validate(&config);
        assert!(!result.has_errors());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn empty_config_is_an_error() {
        let result = validate(&Config::default());
        assert!(result.has_errors());
    }

    #[test]
    fn duplicate_queue_numbers_are_an_error() {
        let config = parse(
            r#"
            [[queue]]
            num = 101
            [[queue]]
            num = 101
        "#,
        );
        let result = validate(&config);
        assert!(result.has_errors());
        assert!(result.errors[0].contains("duplicate"));
    }

    #[test]
    fn zero_timeouts_are_errors() {
        let config = parse(
            r#"
            [[queue]]
            num = 1
            read_timeout_ms = 0
            write_timeout_ms = 0
        "#,
        );
        let result = validate(&config);
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn oversize_packet_len_is_an_error() {
        let config = parse(
            r#"
            [[queue]]
            num = 1
            max_packet_len = 100000
        "#,
        );
        assert!(validate(&config).has_errors());
    }

    #[test]
    fn odd_settings_warn_without_failing() {
        let config = parse(
            r#"
            [[queue]]
            num = 1
            read_timeout_ms = 5000

            [inspect]
            payload_preview = 100000

            [log]
            level = "loud"
            format = "xml"
        "#,
        );
        let result = validate(&config);
        assert!(!result.has_errors());
        assert_eq!(result.warnings.len(), 4);
    }
}
