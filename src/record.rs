//! # Record Model
//!
//! Immutable structured log records with small-string optimized fields.
//!
//! Records are move-only on the fast path; `Clone` exists so buffering
//! decorators can retain a record past the producer's frame, and every copy
//! is explicit at the call site.

use std::fmt;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use smallvec::{Array, SmallVec};

use crate::level::LogLevel;

/// Inline-capacity string. Stays on the stack up to the backing array size
/// and spills to the heap only for oversized values.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SmallStr<A: Array<Item = u8>> {
    buf: SmallVec<A>,
}

impl<A: Array<Item = u8>> Default for SmallStr<A> {
    fn default() -> Self {
        SmallStr::new()
    }
}

/// Message capacity: up to 256 bytes inline.
pub type SmallStr256 = SmallStr<[u8; 256]>;
/// File-path capacity.
pub type SmallStr128 = SmallStr<[u8; 128]>;
/// Thread-id capacity.
pub type SmallStr64 = SmallStr<[u8; 64]>;
/// Field-key capacity.
pub type SmallStr32 = SmallStr<[u8; 32]>;

impl<A: Array<Item = u8>> SmallStr<A> {
    pub fn new() -> Self {
        SmallStr {
            buf: SmallVec::new(),
        }
    }

    pub fn as_str(&self) -> &str {
        // Construction only ever copies from `&str`, so the buffer is
        // always valid UTF-8.
        std::str::from_utf8(&self.buf).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// True when the value exceeded the inline capacity and lives on the heap.
    pub fn spilled(&self) -> bool {
        self.buf.spilled()
    }
}

impl<A: Array<Item = u8>> From<&str> for SmallStr<A> {
    fn from(s: &str) -> Self {
        SmallStr {
            buf: SmallVec::from_slice(s.as_bytes()),
        }
    }
}

impl<A: Array<Item = u8>> From<String> for SmallStr<A> {
    fn from(s: String) -> Self {
        SmallStr::from(s.as_str())
    }
}

impl<A: Array<Item = u8>> fmt::Display for SmallStr<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<A: Array<Item = u8>> fmt::Debug for SmallStr<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl<A: Array<Item = u8>> PartialEq<str> for SmallStr<A> {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl<A: Array<Item = u8>> PartialEq<&str> for SmallStr<A> {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// Structured field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl FieldValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Null => serde_json::Value::Null,
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
            FieldValue::Int(i) => serde_json::Value::from(*i),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            FieldValue::Str(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(v) => write!(f, "{}", v),
            FieldValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

/// Source code location captured at the call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: SmallStr<[u8; 256]>,
    pub line: u32,
    pub function: SmallStr128,
}

impl SourceLocation {
    pub fn new(file: &str, line: u32, function: &str) -> Self {
        SourceLocation {
            file: SmallStr::from(file),
            line,
            function: SmallStr::from(function),
        }
    }

    /// Capture the caller's file and line.
    #[track_caller]
    pub fn caller() -> Self {
        let loc = std::panic::Location::caller();
        SourceLocation::new(loc.file(), loc.line(), "")
    }

    /// Final path component, for compact display.
    pub fn filename(&self) -> &str {
        let file = self.file.as_str();
        file.rsplit(['/', '\\']).next().unwrap_or(file)
    }
}

/// W3C-style trace correlation fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceContext {
    /// 32 lowercase hex characters.
    pub trace_id: String,
    /// 16 lowercase hex characters.
    pub span_id: String,
    pub parent_span_id: Option<String>,
    pub trace_flags: u8,
    pub trace_state: Option<String>,
}

impl TraceContext {
    pub fn new(trace_id: &str, span_id: &str) -> Self {
        TraceContext {
            trace_id: trace_id.to_string(),
            span_id: span_id.to_string(),
            parent_span_id: None,
            trace_flags: 0,
            trace_state: None,
        }
    }
}

pub type FieldList = SmallVec<[(SmallStr32, FieldValue); 8]>;

/// A single log record. Immutable after `RecordBuilder::build`.
#[derive(Debug, Clone)]
pub struct LogRecord {
    level: LogLevel,
    message: SmallStr256,
    timestamp: SystemTime,
    thread_id: SmallStr64,
    location: Option<SourceLocation>,
    category: Option<SmallStr128>,
    fields: FieldList,
    trace: Option<TraceContext>,
}

impl LogRecord {
    /// Start building a record stamped with the current time and thread.
    pub fn builder(level: LogLevel, message: &str) -> RecordBuilder {
        RecordBuilder {
            record: LogRecord {
                level,
                message: SmallStr::from(message),
                timestamp: SystemTime::now(),
                thread_id: current_thread_label(),
                location: None,
                category: None,
                fields: SmallVec::new(),
                trace: None,
            },
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn message(&self) -> &str {
        self.message.as_str()
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn timestamp_utc(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.timestamp)
    }

    pub fn thread_id(&self) -> &str {
        self.thread_id.as_str()
    }

    pub fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_ref().map(|c| c.as_str())
    }

    pub fn fields(&self) -> &[(SmallStr32, FieldValue)] {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, v)| v)
    }

    pub fn trace(&self) -> Option<&TraceContext> {
        self.trace.as_ref()
    }
}

/// Builder for `LogRecord`. The record is frozen once `build` returns.
pub struct RecordBuilder {
    record: LogRecord,
}

impl RecordBuilder {
    /// Borrow the record as built so far (sampling happens before the
    /// context merge finalizes it).
    pub fn peek(&self) -> &LogRecord {
        &self.record
    }

    pub fn timestamp(mut self, ts: SystemTime) -> Self {
        self.record.timestamp = ts;
        self
    }

    pub fn location(mut self, location: SourceLocation) -> Self {
        self.record.location = Some(location);
        self
    }

    pub fn category(mut self, category: &str) -> Self {
        self.record.category = Some(SmallStr::from(category));
        self
    }

    pub fn field(mut self, key: &str, value: impl Into<FieldValue>) -> Self {
        self.record
            .fields
            .push((SmallStr::from(key), value.into()));
        self
    }

    pub fn fields<I>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (SmallStr32, FieldValue)>,
    {
        self.record.fields.extend(pairs);
        self
    }

    pub fn trace(mut self, trace: TraceContext) -> Self {
        self.record.trace = Some(trace);
        self
    }

    pub fn build(self) -> LogRecord {
        self.record
    }
}

/// Label for the current thread: its name when set, otherwise the numeric
/// part of the runtime thread id.
pub fn current_thread_label() -> SmallStr64 {
    let current = std::thread::current();
    if let Some(name) = current.name() {
        if !name.is_empty() {
            return SmallStr::from(name);
        }
    }
    let raw = format!("{:?}", current.id());
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        SmallStr::from(raw.as_str())
    } else {
        SmallStr::from(digits.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_str_inline_and_spill() {
        let short: SmallStr64 = SmallStr::from("worker-1");
        assert_eq!(short, "worker-1");
        assert!(!short.spilled());

        let long: SmallStr32 = SmallStr::from("x".repeat(64).as_str());
        assert_eq!(long.len(), 64);
        assert!(long.spilled());
    }

    #[test]
    fn test_record_builder() {
        let record = LogRecord::builder(LogLevel::Info, "request served")
            .category("http")
            .field("status", 200)
            .field("duration_ms", 12.5)
            .field("cached", false)
            .build();

        assert_eq!(record.level(), LogLevel::Info);
        assert_eq!(record.message(), "request served");
        assert_eq!(record.category(), Some("http"));
        assert_eq!(record.field("status"), Some(&FieldValue::Int(200)));
        assert_eq!(record.field("cached"), Some(&FieldValue::Bool(false)));
        assert_eq!(record.field("missing"), None);
        assert!(!record.thread_id().is_empty());
    }

    #[test]
    fn test_field_order_preserved() {
        let record = LogRecord::builder(LogLevel::Debug, "m")
            .field("a", 1)
            .field("b", 2)
            .field("c", 3)
            .build();
        let keys: Vec<&str> = record.fields().iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_source_location_filename() {
        let loc = SourceLocation::new("/srv/app/src/main.rs", 42, "handle");
        assert_eq!(loc.filename(), "main.rs");
        let win = SourceLocation::new("C:\\app\\main.rs", 7, "run");
        assert_eq!(win.filename(), "main.rs");
    }

    #[test]
    fn test_field_value_json() {
        assert_eq!(FieldValue::Null.to_json(), serde_json::Value::Null);
        assert_eq!(FieldValue::Int(7).to_json(), serde_json::json!(7));
        assert_eq!(
            FieldValue::Str("hi".into()).to_json(),
            serde_json::json!("hi")
        );
        // NaN cannot be represented in JSON and degrades to null.
        assert_eq!(FieldValue::Float(f64::NAN).to_json(), serde_json::Value::Null);
    }
}
