//! # Unified Per-Thread Context
//!
//! Every thread owns a private context store; snapshots (copies) are what
//! enter records and cross threads. Entries carry a category tag so trace,
//! request and OpenTelemetry correlation data can be cleared selectively
//! without disturbing custom application keys.

use std::cell::RefCell;

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::record::{FieldList, FieldValue, SmallStr32, TraceContext};

/// Category tag attached to every context entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextCategory {
    Custom,
    Trace,
    Request,
    Otel,
}

#[derive(Debug, Clone)]
struct ContextEntry {
    value: FieldValue,
    category: ContextCategory,
}

/// Ordered key/value store with category tags.
///
/// Insertion order is preserved for snapshots so formatted output is stable.
#[derive(Debug, Default, Clone)]
pub struct UnifiedContext {
    data: AHashMap<String, ContextEntry>,
    order: Vec<String>,
}

impl UnifiedContext {
    pub fn new() -> Self {
        UnifiedContext::default()
    }

    /// Insert or replace a value under the given category.
    pub fn set(&mut self, key: &str, value: impl Into<FieldValue>, category: ContextCategory) {
        if !self.data.contains_key(key) {
            self.order.push(key.to_string());
        }
        self.data.insert(
            key.to_string(),
            ContextEntry {
                value: value.into(),
                category,
            },
        );
    }

    /// Set the distributed-trace correlation triple.
    pub fn set_trace(&mut self, trace_id: &str, span_id: &str, parent_span_id: Option<&str>) {
        self.set("trace_id", trace_id, ContextCategory::Trace);
        self.set("span_id", span_id, ContextCategory::Trace);
        if let Some(parent) = parent_span_id {
            self.set("parent_span_id", parent, ContextCategory::Trace);
        }
    }

    /// Set request correlation identifiers.
    pub fn set_request(&mut self, request_id: &str, correlation_id: Option<&str>) {
        self.set("request_id", request_id, ContextCategory::Request);
        if let Some(correlation) = correlation_id {
            self.set("correlation_id", correlation, ContextCategory::Request);
        }
    }

    /// Set an OpenTelemetry attribute.
    pub fn set_otel(&mut self, key: &str, value: impl Into<FieldValue>) {
        self.set(key, value, ContextCategory::Otel);
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.data.get(key).map(|e| &e.value)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| v.to_string())
    }

    /// Typed accessor; `None` when the key is absent or the value has a
    /// different type.
    pub fn get_as<T: FromFieldValue>(&self, key: &str) -> Option<T> {
        self.get(key).and_then(T::from_field_value)
    }

    pub fn category_of(&self, key: &str) -> Option<ContextCategory> {
        self.data.get(key).map(|e| e.category)
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Keys in insertion order, restricted to one category.
    pub fn keys_in(&self, category: ContextCategory) -> Vec<String> {
        self.order
            .iter()
            .filter(|k| {
                self.data
                    .get(*k)
                    .is_some_and(|e| e.category == category)
            })
            .cloned()
            .collect()
    }

    pub fn remove(&mut self, key: &str) -> Option<FieldValue> {
        let removed = self.data.remove(key).map(|e| e.value);
        if removed.is_some() {
            self.order.retain(|k| k != key);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.order.clear();
    }

    /// Remove every entry in one category, leaving the rest untouched.
    pub fn clear_category(&mut self, category: ContextCategory) {
        let doomed: Vec<String> = self.keys_in(category);
        for key in doomed {
            self.remove(&key);
        }
    }

    /// Merge entries from another context. When `overwrite` is false,
    /// existing keys win.
    pub fn merge(&mut self, other: &UnifiedContext, overwrite: bool) {
        for key in &other.order {
            if !overwrite && self.data.contains_key(key) {
                continue;
            }
            if let Some(entry) = other.data.get(key) {
                self.set(key, entry.value.clone(), entry.category);
            }
        }
    }

    /// Copy the store into record fields, insertion-ordered. The trace
    /// correlation keys are skipped here; they travel as a typed
    /// `TraceContext` instead.
    pub fn snapshot_fields(&self) -> FieldList {
        let mut out: FieldList = SmallVec::new();
        for key in &self.order {
            if matches!(key.as_str(), "trace_id" | "span_id" | "parent_span_id") {
                continue;
            }
            if let Some(entry) = self.data.get(key) {
                out.push((SmallStr32::from(key.as_str()), entry.value.clone()));
            }
        }
        out
    }

    /// Assemble a `TraceContext` when the trace keys are present.
    pub fn trace_context(&self) -> Option<TraceContext> {
        let trace_id = self.get_string("trace_id")?;
        let span_id = self.get_string("span_id")?;
        Some(TraceContext {
            trace_id,
            span_id,
            parent_span_id: self.get_string("parent_span_id"),
            trace_flags: 0,
            trace_state: None,
        })
    }
}

/// Conversion used by [`UnifiedContext::get_as`].
pub trait FromFieldValue: Sized {
    fn from_field_value(value: &FieldValue) -> Option<Self>;
}

impl FromFieldValue for bool {
    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl FromFieldValue for i64 {
    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl FromFieldValue for f64 {
    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Float(f) => Some(*f),
            FieldValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl FromFieldValue for String {
    fn from_field_value(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Str(s) => Some(s.clone()),
            _ => None,
        }
    }
}

thread_local! {
    static THREAD_CONTEXT: RefCell<UnifiedContext> = RefCell::new(UnifiedContext::new());
}

/// Run a closure with mutable access to the calling thread's context.
pub fn with_context<R>(f: impl FnOnce(&mut UnifiedContext) -> R) -> R {
    THREAD_CONTEXT.with(|slot| f(&mut slot.borrow_mut()))
}

/// Snapshot the calling thread's context for record materialization.
pub fn snapshot() -> (FieldList, Option<TraceContext>) {
    with_context(|ctx| (ctx.snapshot_fields(), ctx.trace_context()))
}

/// RAII guard that sets context keys and restores their previous values
/// (or removes them) on drop. Nested guards unwind in reverse order.
pub struct ContextGuard {
    saved: Vec<(String, Option<(FieldValue, ContextCategory)>)>,
}

impl ContextGuard {
    pub fn new<I, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, V)>,
        V: Into<FieldValue>,
    {
        let mut saved = Vec::new();
        with_context(|ctx| {
            for (key, value) in pairs {
                let previous = ctx
                    .get(&key)
                    .cloned()
                    .map(|v| (v, ctx.category_of(&key).unwrap_or(ContextCategory::Custom)));
                saved.push((key.clone(), previous));
                ctx.set(&key, value, ContextCategory::Custom);
            }
        });
        ContextGuard { saved }
    }

    /// Guard a single key.
    pub fn single(key: &str, value: impl Into<FieldValue>) -> Self {
        ContextGuard::new([(key.to_string(), value.into())])
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        with_context(|ctx| {
            for (key, previous) in self.saved.drain(..).rev() {
                match previous {
                    Some((value, category)) => ctx.set(&key, value, category),
                    None => {
                        ctx.remove(&key);
                    }
                }
            }
        });
    }
}
