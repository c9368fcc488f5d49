use std::fmt;
use std::str::FromStr;

use crate::error::LogError;

/// Log severity, ascending. `Off` is a gate value only; records are never
/// created at `Off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warning = 3,
    Error = 4,
    Fatal = 5,
    Off = 6,
}

impl LogLevel {
    /// Uppercase name as emitted by the JSON formatter and the network wire.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
            LogLevel::Off => "OFF",
        }
    }

    /// Lowercase name as emitted by the logfmt formatter.
    pub fn as_lower_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Fatal => "fatal",
            LogLevel::Off => "off",
        }
    }

    pub fn from_u8(value: u8) -> LogLevel {
        match value {
            0 => LogLevel::Trace,
            1 => LogLevel::Debug,
            2 => LogLevel::Info,
            3 => LogLevel::Warning,
            4 => LogLevel::Error,
            5 => LogLevel::Fatal,
            _ => LogLevel::Off,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = LogError;

    /// Parse a level name, case-insensitive. Accepts the aliases `warn`,
    /// `critical` and `off`/`none` used by external configuration.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            "fatal" | "critical" => Ok(LogLevel::Fatal),
            "off" | "none" => Ok(LogLevel::Off),
            _ => Err(LogError::InvalidArgument(format!(
                "invalid log level: '{}'",
                name
            ))),
        }
    }
}

/// Normalize a level index from a backend that counts severity downward
/// (0 = most severe), such as syslog-style enumerations.
///
/// The boundary is explicit so foreign enumerations never leak into the
/// record model.
pub fn from_descending_index(index: u8) -> LogLevel {
    match index {
        0 => LogLevel::Fatal,
        1 => LogLevel::Error,
        2 => LogLevel::Warning,
        3 => LogLevel::Info,
        4 => LogLevel::Debug,
        _ => LogLevel::Trace,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Trace < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Fatal);
        assert!(LogLevel::Fatal < LogLevel::Off);
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("warn".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("critical".parse::<LogLevel>().unwrap(), LogLevel::Fatal);
        assert_eq!("fatal".parse::<LogLevel>().unwrap(), LogLevel::Fatal);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_round_trip_u8() {
        for level in [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warning,
            LogLevel::Error,
            LogLevel::Fatal,
            LogLevel::Off,
        ] {
            assert_eq!(LogLevel::from_u8(level as u8), level);
        }
    }

    #[test]
    fn test_descending_normalization() {
        assert_eq!(from_descending_index(0), LogLevel::Fatal);
        assert_eq!(from_descending_index(3), LogLevel::Info);
        assert_eq!(from_descending_index(9), LogLevel::Trace);
    }
}
