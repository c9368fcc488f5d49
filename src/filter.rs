//! Record filters. Filters decide pass/reject and never mutate records.

use crate::level::LogLevel;
use crate::record::LogRecord;

/// Pass/reject decision over a record.
pub trait LogFilter: Send + Sync {
    fn passes(&self, record: &LogRecord) -> bool;

    /// Short identifier used in decorator names and diagnostics.
    fn name(&self) -> &'static str;
}

/// Passes records at or above a threshold level.
#[derive(Debug, Clone)]
pub struct LevelFilter {
    threshold: LogLevel,
}

impl LevelFilter {
    pub fn new(threshold: LogLevel) -> Self {
        LevelFilter { threshold }
    }

    pub fn threshold(&self) -> LogLevel {
        self.threshold
    }
}

impl LogFilter for LevelFilter {
    fn passes(&self, record: &LogRecord) -> bool {
        record.level() >= self.threshold
    }

    fn name(&self) -> &'static str {
        "level"
    }
}

/// Passes records for which the user predicate returns true.
pub struct PredicateFilter {
    predicate: Box<dyn Fn(&LogRecord) -> bool + Send + Sync>,
}

impl PredicateFilter {
    pub fn new(predicate: impl Fn(&LogRecord) -> bool + Send + Sync + 'static) -> Self {
        PredicateFilter {
            predicate: Box::new(predicate),
        }
    }
}

impl LogFilter for PredicateFilter {
    fn passes(&self, record: &LogRecord) -> bool {
        (self.predicate)(record)
    }

    fn name(&self) -> &'static str {
        "predicate"
    }
}

/// Combination operator for [`CompositeFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositeOp {
    And,
    Or,
}

/// AND/OR over child filters, short-circuiting in child order.
pub struct CompositeFilter {
    op: CompositeOp,
    children: Vec<Box<dyn LogFilter>>,
}

impl CompositeFilter {
    pub fn new(op: CompositeOp) -> Self {
        CompositeFilter {
            op,
            children: Vec::new(),
        }
    }

    pub fn with(mut self, filter: impl LogFilter + 'static) -> Self {
        self.children.push(Box::new(filter));
        self
    }

    pub fn push(&mut self, filter: Box<dyn LogFilter>) {
        self.children.push(filter);
    }
}

impl LogFilter for CompositeFilter {
    fn passes(&self, record: &LogRecord) -> bool {
        match self.op {
            CompositeOp::And => self.children.iter().all(|f| f.passes(record)),
            CompositeOp::Or => {
                // An empty OR matches everything, same as the null filter.
                self.children.is_empty() || self.children.iter().any(|f| f.passes(record))
            }
        }
    }

    fn name(&self) -> &'static str {
        match self.op {
            CompositeOp::And => "all_of",
            CompositeOp::Or => "any_of",
        }
    }
}

/// Always passes. Stands in when a pipeline has no filter attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullFilter;

impl LogFilter for NullFilter {
    fn passes(&self, _record: &LogRecord) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(level: LogLevel) -> LogRecord {
        LogRecord::builder(level, "msg").build()
    }

    #[test]
    fn test_level_filter() {
        let filter = LevelFilter::new(LogLevel::Warning);
        assert!(!filter.passes(&record(LogLevel::Info)));
        assert!(filter.passes(&record(LogLevel::Warning)));
        assert!(filter.passes(&record(LogLevel::Fatal)));
    }

    #[test]
    fn test_predicate_filter() {
        let filter = PredicateFilter::new(|r| r.message().contains("keep"));
        assert!(filter.passes(&LogRecord::builder(LogLevel::Info, "keep me").build()));
        assert!(!filter.passes(&LogRecord::builder(LogLevel::Info, "drop me").build()));
    }

    #[test]
    fn test_composite_and() {
        let filter = CompositeFilter::new(CompositeOp::And)
            .with(LevelFilter::new(LogLevel::Info))
            .with(PredicateFilter::new(|r| r.category() == Some("http")));
        let pass = LogRecord::builder(LogLevel::Error, "m").category("http").build();
        let wrong_category = LogRecord::builder(LogLevel::Error, "m").category("db").build();
        let too_low = LogRecord::builder(LogLevel::Debug, "m").category("http").build();
        assert!(filter.passes(&pass));
        assert!(!filter.passes(&wrong_category));
        assert!(!filter.passes(&too_low));
    }

    #[test]
    fn test_composite_or() {
        let filter = CompositeFilter::new(CompositeOp::Or)
            .with(LevelFilter::new(LogLevel::Error))
            .with(PredicateFilter::new(|r| r.category() == Some("audit")));
        assert!(filter.passes(&record(LogLevel::Error)));
        let audit = LogRecord::builder(LogLevel::Debug, "m").category("audit").build();
        assert!(filter.passes(&audit));
        assert!(!filter.passes(&record(LogLevel::Debug)));
    }

    #[test]
    fn test_empty_composites() {
        assert!(CompositeFilter::new(CompositeOp::And).passes(&record(LogLevel::Info)));
        assert!(CompositeFilter::new(CompositeOp::Or).passes(&record(LogLevel::Info)));
    }

    #[test]
    fn test_null_filter() {
        assert!(NullFilter.passes(&record(LogLevel::Trace)));
    }
}
