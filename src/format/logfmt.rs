use chrono::SecondsFormat;

use super::LogFormatter;
use crate::record::LogRecord;

/// logfmt line formatter: space-separated `key=value` pairs.
///
/// Values containing whitespace, `=` or `"` are double-quoted with `\"`,
/// `\\`, `\n`, `\r` and `\t` escapes, so a conforming logfmt parser
/// recovers the exact input. The level is lowercased; `trace_id` and
/// `span_id` are emitted when the record carries trace correlation.
#[derive(Debug, Clone, Default)]
pub struct LogfmtFormatter;

impl LogfmtFormatter {
    pub fn new() -> Self {
        LogfmtFormatter
    }

    fn needs_quoting(value: &str) -> bool {
        value.is_empty()
            || value
                .chars()
                .any(|c| c.is_whitespace() || c == '=' || c == '"')
    }

    fn push_value(out: &mut String, value: &str) {
        if !Self::needs_quoting(value) {
            out.push_str(value);
            return;
        }
        out.push('"');
        for c in value.chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                _ => out.push(c),
            }
        }
        out.push('"');
    }

    fn push_pair(out: &mut String, key: &str, value: &str) {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(key);
        out.push('=');
        Self::push_value(out, value);
    }
}

impl LogFormatter for LogfmtFormatter {
    fn format(&self, record: &LogRecord) -> String {
        let mut out = String::with_capacity(96 + record.message().len());

        Self::push_pair(
            &mut out,
            "ts",
            &record
                .timestamp_utc()
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        Self::push_pair(&mut out, "level", record.level().as_lower_str());
        Self::push_pair(&mut out, "msg", record.message());

        if !record.thread_id().is_empty() {
            Self::push_pair(&mut out, "thread_id", record.thread_id());
        }
        if let Some(location) = record.location() {
            Self::push_pair(&mut out, "file", location.file.as_str());
            Self::push_pair(&mut out, "line", &location.line.to_string());
            if !location.function.is_empty() {
                Self::push_pair(&mut out, "function", location.function.as_str());
            }
        }
        if let Some(category) = record.category() {
            Self::push_pair(&mut out, "category", category);
        }
        if let Some(trace) = record.trace() {
            if !trace.trace_id.is_empty() {
                Self::push_pair(&mut out, "trace_id", &trace.trace_id);
            }
            if !trace.span_id.is_empty() {
                Self::push_pair(&mut out, "span_id", &trace.span_id);
            }
        }
        for (key, value) in record.fields() {
            Self::push_pair(&mut out, key.as_str(), &value.to_string());
        }

        out
    }

    fn name(&self) -> &'static str {
        "logfmt"
    }
}
