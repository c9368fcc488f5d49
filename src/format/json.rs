//! # JSON Formatting
//!
//! One object per record. Field values keep their types; escaping is
//! delegated to serde_json so output always round-trips through a
//! conforming parser.

use chrono::SecondsFormat;
use serde_json::{Map, Value};

use super::LogFormatter;
use crate::record::LogRecord;

/// Structured JSON line formatter.
///
/// Keys: `timestamp` (ISO-8601 UTC, `Z` suffix), `level` (uppercase),
/// `thread_id`, `message`, then `file`/`line`/`function` when a source
/// location is present, `category` when set, trace correlation ids when
/// present, and finally every structured field in record order.
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    pub fn new() -> Self {
        JsonFormatter { pretty: false }
    }

    pub fn pretty() -> Self {
        JsonFormatter { pretty: true }
    }
}

impl LogFormatter for JsonFormatter {
    fn format(&self, record: &LogRecord) -> String {
        let mut object = Map::with_capacity(8 + record.fields().len());
        object.insert(
            "timestamp".to_string(),
            Value::String(
                record
                    .timestamp_utc()
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
        );
        object.insert(
            "level".to_string(),
            Value::String(record.level().as_str().to_string()),
        );
        object.insert(
            "thread_id".to_string(),
            Value::String(record.thread_id().to_string()),
        );
        object.insert(
            "message".to_string(),
            Value::String(record.message().to_string()),
        );

        if let Some(location) = record.location() {
            object.insert(
                "file".to_string(),
                Value::String(location.file.as_str().to_string()),
            );
            object.insert("line".to_string(), Value::from(location.line));
            if !location.function.is_empty() {
                object.insert(
                    "function".to_string(),
                    Value::String(location.function.as_str().to_string()),
                );
            }
        }

        if let Some(category) = record.category() {
            object.insert("category".to_string(), Value::String(category.to_string()));
        }

        if let Some(trace) = record.trace() {
            object.insert(
                "trace_id".to_string(),
                Value::String(trace.trace_id.clone()),
            );
            object.insert("span_id".to_string(), Value::String(trace.span_id.clone()));
            if let Some(parent) = &trace.parent_span_id {
                object.insert("parent_span_id".to_string(), Value::String(parent.clone()));
            }
        }

        for (key, value) in record.fields() {
            object.insert(key.as_str().to_string(), value.to_json());
        }

        let value = Value::Object(object);
        if self.pretty {
            serde_json::to_string_pretty(&value).unwrap_or_default()
        } else {
            serde_json::to_string(&value).unwrap_or_default()
        }
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::LogLevel;
    use crate::record::{SourceLocation, TraceContext};

    #[test]
    fn test_round_trip() {
        let record = LogRecord::builder(LogLevel::Info, "hello \"world\"\nline2")
            .field("count", 3)
            .field("ratio", 0.5)
            .field("ok", true)
            .field("note", "tab\there")
            .build();
        let line = JsonFormatter::new().format(&record);
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();

        assert_eq!(parsed["level"], "INFO");
        assert_eq!(parsed["message"], "hello \"world\"\nline2");
        assert_eq!(parsed["count"], 3);
        assert_eq!(parsed["ratio"], 0.5);
        assert_eq!(parsed["ok"], true);
        assert_eq!(parsed["note"], "tab\there");
    }

    #[test]
    fn test_timestamp_is_utc_with_z() {
        let record = LogRecord::builder(LogLevel::Debug, "m").build();
        let line = JsonFormatter::new().format(&record);
        let parsed: serde_json::Value = serde_json::from_str(&line).unwrap();
        let stamp = parsed["timestamp"].as_str().unwrap();
        assert!(stamp.ends_with('Z'), "expected Z suffix, got {}", stamp);
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());
    }

    #[test]
    fn test_location_and_trace_keys() {
        let record = LogRecord::builder(LogLevel::Error, "m")
            .location(SourceLocation::new("svc.rs", 10, "serve"))
            .trace(TraceContext::new(
                "0af7651916cd43dd8448eb211c80319c",
                "b7ad6b7169203331",
            ))
            .build();
        let parsed: serde_json::Value =
            serde_json::from_str(&JsonFormatter::new().format(&record)).unwrap();
        assert_eq!(parsed["file"], "svc.rs");
        assert_eq!(parsed["line"], 10);
        assert_eq!(parsed["function"], "serve");
        assert_eq!(parsed["trace_id"], "0af7651916cd43dd8448eb211c80319c");
        assert_eq!(parsed["span_id"], "b7ad6b7169203331");
    }

    #[test]
    fn test_optional_keys_absent() {
        let record = LogRecord::builder(LogLevel::Info, "m").build();
        let parsed: serde_json::Value =
            serde_json::from_str(&JsonFormatter::new().format(&record)).unwrap();
        assert!(parsed.get("file").is_none());
        assert!(parsed.get("category").is_none());
        assert!(parsed.get("trace_id").is_none());
    }

    #[test]
    fn test_key_emission_order() {
        // Header keys first, then structured fields in record order, even
        // when field names sort ahead of the header keys.
        let record = LogRecord::builder(LogLevel::Info, "m")
            .field("zeta", 1)
            .field("aaa", 2)
            .build();
        let line = JsonFormatter::new().format(&record);
        let position = |key: &str| {
            line.find(&format!("\"{}\"", key))
                .unwrap_or_else(|| panic!("missing key {} in {}", key, line))
        };
        assert!(position("timestamp") < position("level"));
        assert!(position("level") < position("thread_id"));
        assert!(position("thread_id") < position("message"));
        assert!(position("message") < position("zeta"));
        assert!(position("zeta") < position("aaa"));
    }

    #[test]
    fn test_pretty_mode() {
        let record = LogRecord::builder(LogLevel::Info, "m").field("k", 1).build();
        let compact = JsonFormatter::new().format(&record);
        let pretty = JsonFormatter::pretty().format(&record);
        assert!(!compact.contains('\n'));
        assert!(pretty.contains('\n'));
        let a: serde_json::Value = serde_json::from_str(&compact).unwrap();
        let b: serde_json::Value = serde_json::from_str(&pretty).unwrap();
        assert_eq!(a, b);
    }
}
