use chrono::{DateTime, Local};

use super::LogFormatter;
use crate::level::LogLevel;
use crate::record::LogRecord;

/// Human-readable line formatter:
///
/// `[YYYY-MM-DD HH:MM:SS.mmm] [LEVEL] [thread:ID] message [file:line in function()]`
///
/// Optional parts (thread, source location) omit their brackets entirely
/// when absent. Colors, when enabled, wrap the level tag with the ANSI code
/// for that level.
#[derive(Debug, Clone)]
pub struct TimestampFormatter {
    use_color: bool,
}

impl TimestampFormatter {
    pub fn new() -> Self {
        TimestampFormatter { use_color: false }
    }

    pub fn with_color(use_color: bool) -> Self {
        TimestampFormatter { use_color }
    }

    fn level_color(level: LogLevel) -> &'static str {
        match level {
            LogLevel::Fatal => "35",   // magenta
            LogLevel::Error => "31",   // red
            LogLevel::Warning => "33", // yellow
            LogLevel::Info => "32",    // green
            LogLevel::Debug => "36",   // cyan
            _ => "37",                 // white
        }
    }
}

impl Default for TimestampFormatter {
    fn default() -> Self {
        TimestampFormatter::new()
    }
}

impl LogFormatter for TimestampFormatter {
    fn format(&self, record: &LogRecord) -> String {
        let local: DateTime<Local> = record.timestamp().into();
        let mut out = String::with_capacity(64 + record.message().len());

        out.push('[');
        out.push_str(&local.format("%Y-%m-%d %H:%M:%S%.3f").to_string());
        out.push_str("] ");

        if self.use_color {
            out.push_str("\x1b[");
            out.push_str(Self::level_color(record.level()));
            out.push_str("m[");
            out.push_str(record.level().as_str());
            out.push_str("]\x1b[0m ");
        } else {
            out.push('[');
            out.push_str(record.level().as_str());
            out.push_str("] ");
        }

        if !record.thread_id().is_empty() {
            out.push_str("[thread:");
            out.push_str(record.thread_id());
            out.push_str("] ");
        }

        out.push_str(record.message());

        if let Some(location) = record.location() {
            out.push_str(" [");
            out.push_str(location.file.as_str());
            out.push(':');
            out.push_str(&location.line.to_string());
            if !location.function.is_empty() {
                out.push_str(" in ");
                out.push_str(location.function.as_str());
                out.push_str("()");
            }
            out.push(']');
        }

        out
    }

    fn name(&self) -> &'static str {
        "timestamp"
    }
}
