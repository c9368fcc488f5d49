use chrono::{DateTime, Local, SecondsFormat};
use regex::Regex;

use super::LogFormatter;
use crate::record::LogRecord;

/// User-pattern formatter.
///
/// Recognized placeholders: `{timestamp}` (ISO-8601 UTC), `{timestamp_local}`,
/// `{level}`, `{level_lower}`, `{message}`, `{thread_id}`, `{file}`,
/// `{filename}`, `{line}`, `{function}`, `{category}`, `{trace_id}`,
/// `{span_id}`, plus any structured field key. `{name:N}` pads the rendered
/// value to display width N; ANSI escape sequences do not count toward the
/// width. Unknown placeholders are left verbatim.
pub struct TemplateFormatter {
    template: String,
    placeholder: Regex,
}

impl TemplateFormatter {
    pub fn new(template: &str) -> Self {
        TemplateFormatter {
            template: template.to_string(),
            // {key} or {key:width}
            placeholder: Regex::new(r"\{([A-Za-z0-9_]+)(?::(\d+))?\}")
                .expect("placeholder pattern is valid"),
        }
    }

    fn resolve(record: &LogRecord, key: &str) -> Option<String> {
        match key {
            "timestamp" => Some(
                record
                    .timestamp_utc()
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
            "timestamp_local" => {
                let local: DateTime<Local> = record.timestamp().into();
                Some(local.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
            }
            "level" => Some(record.level().as_str().to_string()),
            "level_lower" => Some(record.level().as_lower_str().to_string()),
            "message" => Some(record.message().to_string()),
            "thread_id" => Some(record.thread_id().to_string()),
            "file" => record.location().map(|l| l.file.as_str().to_string()),
            "filename" => record.location().map(|l| l.filename().to_string()),
            "line" => record.location().map(|l| l.line.to_string()),
            "function" => record.location().map(|l| l.function.as_str().to_string()),
            "category" => record.category().map(|c| c.to_string()),
            "trace_id" => record.trace().map(|t| t.trace_id.clone()),
            "span_id" => record.trace().map(|t| t.span_id.clone()),
            _ => record.field(key).map(|v| v.to_string()),
        }
    }

    /// Display width ignoring ANSI escape sequences.
    fn visible_width(text: &str) -> usize {
        let mut width = 0;
        let mut in_escape = false;
        for c in text.chars() {
            if in_escape {
                if c.is_ascii_alphabetic() {
                    in_escape = false;
                }
            } else if c == '\x1b' {
                in_escape = true;
            } else {
                width += 1;
            }
        }
        width
    }

    fn pad(value: String, width: usize) -> String {
        let visible = Self::visible_width(&value);
        if visible >= width {
            return value;
        }
        let mut out = value;
        out.extend(std::iter::repeat_n(' ', width - visible));
        out
    }
}

impl LogFormatter for TemplateFormatter {
    fn format(&self, record: &LogRecord) -> String {
        self.placeholder
            .replace_all(&self.template, |caps: &regex::Captures| {
                let key = &caps[1];
                match Self::resolve(record, key) {
                    Some(value) => match caps.get(2) {
                        Some(width) => {
                            let width = width.as_str().parse::<usize>().unwrap_or(0);
                            Self::pad(value, width)
                        }
                        None => value,
                    },
                    // Unknown key stays literal so typos are visible.
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    fn name(&self) -> &'static str {
        "template"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::LogLevel;
    use crate::record::{SourceLocation, TraceContext};

    #[test]
    fn test_basic_substitution() {
        let record = LogRecord::builder(LogLevel::Info, "started").build();
        let formatter = TemplateFormatter::new("{level} | {message}");
        assert_eq!(formatter.format(&record), "INFO | started");
    }

    #[test]
    fn test_level_lower_and_fields() {
        let record = LogRecord::builder(LogLevel::Error, "fail")
            .field("code", 500)
            .build();
        let formatter = TemplateFormatter::new("{level_lower}:{message}:{code}");
        assert_eq!(formatter.format(&record), "error:fail:500");
    }

    #[test]
    fn test_location_placeholders() {
        let record = LogRecord::builder(LogLevel::Debug, "m")
            .location(SourceLocation::new("/srv/app/io.rs", 31, "read_all"))
            .build();
        let formatter = TemplateFormatter::new("{filename}:{line} {function}");
        assert_eq!(formatter.format(&record), "io.rs:31 read_all");
    }

    #[test]
    fn test_width_padding() {
        let record = LogRecord::builder(LogLevel::Info, "m").build();
        let formatter = TemplateFormatter::new("[{level:7}]");
        assert_eq!(formatter.format(&record), "[INFO   ]");
    }

    #[test]
    fn test_width_excludes_ansi() {
        assert_eq!(TemplateFormatter::visible_width("\x1b[31mERROR\x1b[0m"), 5);
        assert_eq!(
            TemplateFormatter::pad("\x1b[31mOK\x1b[0m".to_string(), 4),
            "\x1b[31mOK\x1b[0m  "
        );
    }

    #[test]
    fn test_unknown_placeholder_kept() {
        let record = LogRecord::builder(LogLevel::Info, "m").build();
        let formatter = TemplateFormatter::new("{message} {nonexistent}");
        assert_eq!(formatter.format(&record), "m {nonexistent}");
    }

    #[test]
    fn test_trace_placeholders() {
        let record = LogRecord::builder(LogLevel::Info, "m")
            .trace(TraceContext::new("abc", "def"))
            .build();
        let formatter = TemplateFormatter::new("{trace_id}/{span_id}");
        assert_eq!(formatter.format(&record), "abc/def");
    }

    #[test]
    fn test_timestamp_placeholder_is_utc() {
        let record = LogRecord::builder(LogLevel::Info, "m").build();
        let out = TemplateFormatter::new("{timestamp}").format(&record);
        assert!(out.ends_with('Z'));
    }
}
