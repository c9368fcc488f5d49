//! # Configuration
//!
//! All tunables live in an explicit [`LoggerConfig`] constructed at init and
//! passed down; there is no hidden process-wide configuration state. The
//! `LOG_ENV` and `LOG_LEVEL` environment variables map onto presets and are
//! applied only when [`LoggerConfig::from_env`] is called.

use std::path::PathBuf;
use std::time::Duration;

use crate::crypt::EncryptionConfig;
use crate::error::{LogError, Result};
use crate::level::LogLevel;
use crate::overflow::OverflowPolicy;

/// Deployment environment presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Testing,
    Staging,
    Production,
}

impl Environment {
    pub fn parse(name: &str) -> Option<Environment> {
        match name.to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Environment::Development),
            "testing" | "test" => Some(Environment::Testing),
            "staging" => Some(Environment::Staging),
            "production" | "prod" => Some(Environment::Production),
            _ => None,
        }
    }
}

/// Complete logger configuration.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Minimum level; records below it are gated out with no allocation.
    pub min_level: LogLevel,
    /// Bounded queue capacity for async pipelines. Powers of two preferred.
    pub queue_size: usize,
    /// Records drained per worker wakeup before the inner writer flushes.
    pub batch_size: usize,
    /// Idle flush interval for buffered/async stages.
    pub flush_interval: Duration,
    /// Policy applied when an async queue is full.
    pub overflow_policy: OverflowPolicy,
    /// Upper bound for the `Grow` overflow policy.
    pub max_queue_size: usize,
    /// Directory for file sinks created from this config.
    pub log_directory: PathBuf,
    /// File name prefix for file sinks created from this config.
    pub log_file_prefix: String,
    /// Size-based rotation threshold in bytes.
    pub max_file_size: u64,
    /// Number of rotated backups retained.
    pub max_file_count: usize,
    /// Remote endpoint host for the network sink.
    pub remote_host: Option<String>,
    /// Remote endpoint port for the network sink.
    pub remote_port: u16,
    /// Connect/send timeout for the network sink.
    pub network_timeout: Duration,
    /// Maintain metric counters.
    pub enable_metrics: bool,
    /// Pre-allocate the emergency ring and expose the signal-safe accessors.
    pub enable_crash_handler: bool,
    /// Merge the per-thread context snapshot into materialized records.
    pub enable_structured_logging: bool,
    /// ANSI colors on the human-readable formatter.
    pub enable_color: bool,
    /// Encrypted-sink settings, when encryption is in use.
    pub encryption: Option<EncryptionConfig>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            min_level: LogLevel::Info,
            queue_size: 8192,
            batch_size: 100,
            flush_interval: Duration::from_millis(1000),
            overflow_policy: OverflowPolicy::DropOldest,
            max_queue_size: 100_000,
            log_directory: PathBuf::from("logs"),
            log_file_prefix: "app".to_string(),
            max_file_size: 10 * 1024 * 1024,
            max_file_count: 5,
            remote_host: None,
            remote_port: 0,
            network_timeout: Duration::from_secs(5),
            enable_metrics: true,
            enable_crash_handler: false,
            enable_structured_logging: true,
            enable_color: true,
            encryption: None,
        }
    }
}

impl LoggerConfig {
    /// Preset tuned for the given environment.
    pub fn for_environment(env: Environment) -> Self {
        let base = LoggerConfig::default();
        match env {
            Environment::Development => LoggerConfig {
                min_level: LogLevel::Debug,
                queue_size: 1024,
                enable_color: true,
                ..base
            },
            Environment::Testing => LoggerConfig {
                min_level: LogLevel::Trace,
                queue_size: 256,
                flush_interval: Duration::from_millis(50),
                enable_color: false,
                ..base
            },
            Environment::Staging => LoggerConfig {
                min_level: LogLevel::Info,
                queue_size: 8192,
                ..base
            },
            Environment::Production => LoggerConfig {
                min_level: LogLevel::Info,
                queue_size: 32_768,
                batch_size: 250,
                enable_color: false,
                enable_crash_handler: true,
                ..base
            },
        }
    }

    /// Build a config from `LOG_ENV`, `LOG_LEVEL` and `LOG_MAX_FILE_SIZE`.
    /// Unset or unrecognized variables fall back to the preset values.
    pub fn from_env() -> Self {
        let mut config = std::env::var("LOG_ENV")
            .ok()
            .and_then(|v| Environment::parse(&v))
            .map(LoggerConfig::for_environment)
            .unwrap_or_default();
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            if let Ok(level) = level.parse::<LogLevel>() {
                config.min_level = level;
            }
        }
        if let Ok(size) = std::env::var("LOG_MAX_FILE_SIZE") {
            if let Some(bytes) = parse_size_limit(&size) {
                config.max_file_size = bytes;
            }
        }
        config
    }

    /// Reject configurations that cannot work before any writer is built.
    pub fn validate(&self) -> Result<()> {
        if self.queue_size == 0 {
            return Err(LogError::InvalidConfiguration(
                "queue_size must be greater than zero".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(LogError::InvalidConfiguration(
                "batch_size must be greater than zero".into(),
            ));
        }
        if self.max_queue_size < self.queue_size {
            return Err(LogError::InvalidConfiguration(
                "max_queue_size must be at least queue_size".into(),
            ));
        }
        if self.max_file_size == 0 {
            return Err(LogError::InvalidConfiguration(
                "max_file_size must be greater than zero".into(),
            ));
        }
        if self.max_file_count == 0 {
            return Err(LogError::InvalidConfiguration(
                "max_file_count must be greater than zero".into(),
            ));
        }
        if self.log_file_prefix.is_empty() {
            return Err(LogError::InvalidConfiguration(
                "log_file_prefix must not be empty".into(),
            ));
        }
        if self.remote_host.is_some() && self.remote_port == 0 {
            return Err(LogError::InvalidConfiguration(
                "remote_port required when remote_host is set".into(),
            ));
        }
        if let Some(encryption) = &self.encryption {
            encryption.validate()?;
        }
        Ok(())
    }
}

/// Parse size strings like "500B", "5KB", "10MB", "1GB" into bytes.
/// A bare number is taken as bytes; units are case-insensitive. Overflowing
/// sizes return `None`.
pub fn parse_size_limit(size_str: &str) -> Option<u64> {
    let trimmed = size_str.trim();
    let digits_len = trimmed
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(trimmed.len(), |(i, _)| i);
    let (digits, suffix) = trimmed.split_at(digits_len);
    if digits.is_empty() {
        return None;
    }

    let value: u64 = digits.parse().ok()?;
    let shift = match suffix.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 0u32,
        "K" | "KB" => 10,
        "M" | "MB" => 20,
        "G" | "GB" => 30,
        "T" | "TB" => 40,
        _ => return None,
    };
    value.checked_mul(1u64 << shift)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(LoggerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        let mut config = LoggerConfig::default();
        config.queue_size = 0;
        assert!(config.validate().is_err());

        let mut config = LoggerConfig::default();
        config.max_queue_size = config.queue_size - 1;
        assert!(config.validate().is_err());

        let mut config = LoggerConfig::default();
        config.remote_host = Some("logs.example.com".into());
        config.remote_port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_environment_presets() {
        let dev = LoggerConfig::for_environment(Environment::Development);
        assert_eq!(dev.min_level, LogLevel::Debug);
        let prod = LoggerConfig::for_environment(Environment::Production);
        assert_eq!(prod.min_level, LogLevel::Info);
        assert!(!prod.enable_color);
        assert!(prod.enable_crash_handler);
        assert!(prod.queue_size > dev.queue_size);
    }

    #[test]
    fn test_environment_parse() {
        assert_eq!(Environment::parse("dev"), Some(Environment::Development));
        assert_eq!(
            Environment::parse("PRODUCTION"),
            Some(Environment::Production)
        );
        assert_eq!(Environment::parse("qa"), None);
    }

    #[test]
    fn test_parse_size_limit() {
        assert_eq!(parse_size_limit("1024"), Some(1024));
        assert_eq!(parse_size_limit("500B"), Some(500));
        assert_eq!(parse_size_limit("1KB"), Some(1024));
        assert_eq!(parse_size_limit("10mb"), Some(10 * 1024 * 1024));
        assert_eq!(parse_size_limit("1G"), Some(1024 * 1024 * 1024));
        assert_eq!(parse_size_limit("2T"), Some(2u64 << 40));
        assert_eq!(parse_size_limit(" 5 KB "), Some(5120));
        assert_eq!(parse_size_limit("KB"), None);
        assert_eq!(parse_size_limit(""), None);
        assert_eq!(parse_size_limit("invalid"), None);
        assert_eq!(parse_size_limit("10XB"), None);
        // Multiplication past u64::MAX is rejected, not wrapped.
        assert_eq!(parse_size_limit("99999999999999999T"), None);
    }
}
