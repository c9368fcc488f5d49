use std::time::Instant;

use super::{LogWriter, WriterCapability};
use crate::error::Result;
use crate::filter::LogFilter;
use crate::record::LogRecord;
use crate::sink::SinkInfo;

/// Decorator that consults a filter before delegating. Rejected records
/// report success without touching the inner writer, so different pipelines
/// can carry different filters.
pub struct FilteredWriter {
    filter: Box<dyn LogFilter>,
    inner: Box<dyn LogWriter>,
}

impl FilteredWriter {
    pub fn new(filter: Box<dyn LogFilter>, inner: Box<dyn LogWriter>) -> Self {
        FilteredWriter { filter, inner }
    }
}

impl LogWriter for FilteredWriter {
    fn write(&mut self, record: &LogRecord) -> Result<()> {
        if !self.filter.passes(record) {
            return Ok(());
        }
        self.inner.write(record)
    }

    fn write_preformatted(&mut self, record: &LogRecord, formatted: &str) -> Result<()> {
        if !self.filter.passes(record) {
            return Ok(());
        }
        self.inner.write_preformatted(record, formatted)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    fn is_healthy(&self) -> bool {
        self.inner.is_healthy()
    }

    fn name(&self) -> String {
        format!("filtered({})_{}", self.filter.name(), self.inner.name())
    }

    fn capability(&self) -> WriterCapability {
        WriterCapability::Decorator
    }

    fn info(&self) -> SinkInfo {
        self.inner.info()
    }

    fn start(&mut self) -> Result<()> {
        self.inner.start()
    }

    fn stop(&mut self, deadline: Option<Instant>) -> Result<usize> {
        self.inner.stop(deadline)
    }

    fn pending(&self) -> usize {
        self.inner.pending()
    }
}
