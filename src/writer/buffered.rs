use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::{LogWriter, WriterCapability};
use crate::error::Result;
use crate::record::LogRecord;
use crate::sink::SinkInfo;

struct BufferedEntry {
    record: LogRecord,
    formatted: Option<String>,
}

struct BufferState {
    entries: Vec<BufferedEntry>,
    last_flush: Instant,
}

/// Decorator that accumulates records and delegates them in order when the
/// buffer fills, the flush interval elapses, flush is called explicitly, or
/// the writer drops. One mutex guards the buffer; the critical section
/// while delegating is the only producer-visible suspension.
pub struct BufferedWriter {
    inner: Box<dyn LogWriter>,
    buffer: Mutex<BufferState>,
    max_entries: usize,
    flush_interval: Duration,
}

impl BufferedWriter {
    pub fn new(inner: Box<dyn LogWriter>, max_entries: usize, flush_interval: Duration) -> Self {
        let max_entries = max_entries.max(1);
        BufferedWriter {
            inner,
            buffer: Mutex::new(BufferState {
                entries: Vec::with_capacity(max_entries.min(4096)),
                last_flush: Instant::now(),
            }),
            max_entries,
            flush_interval,
        }
    }

    pub fn buffered_count(&self) -> usize {
        self.buffer.lock().entries.len()
    }

    fn push(&mut self, entry: BufferedEntry) -> Result<()> {
        let mut state = self.buffer.lock();
        state.entries.push(entry);
        let full = state.entries.len() >= self.max_entries;
        let stale = state.last_flush.elapsed() >= self.flush_interval;
        if full || stale {
            return Self::drain(&mut state, &mut self.inner);
        }
        Ok(())
    }

    /// Delegate buffered entries in order and clear the buffer.
    fn drain(state: &mut BufferState, inner: &mut Box<dyn LogWriter>) -> Result<()> {
        let mut first_error = None;
        for entry in state.entries.drain(..) {
            let outcome = match &entry.formatted {
                Some(text) => inner.write_preformatted(&entry.record, text),
                None => inner.write(&entry.record),
            };
            if let Err(e) = outcome {
                first_error.get_or_insert(e);
            }
        }
        state.last_flush = Instant::now();
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl LogWriter for BufferedWriter {
    fn write(&mut self, record: &LogRecord) -> Result<()> {
        // Explicit copy: the buffer retains the record past the caller's frame.
        self.push(BufferedEntry {
            record: record.clone(),
            formatted: None,
        })
    }

    fn write_preformatted(&mut self, record: &LogRecord, formatted: &str) -> Result<()> {
        self.push(BufferedEntry {
            record: record.clone(),
            formatted: Some(formatted.to_string()),
        })
    }

    fn flush(&mut self) -> Result<()> {
        {
            let mut state = self.buffer.lock();
            Self::drain(&mut state, &mut self.inner)?;
        }
        self.inner.flush()
    }

    fn is_healthy(&self) -> bool {
        self.inner.is_healthy()
    }

    fn name(&self) -> String {
        format!("buffered({})_{}", self.max_entries, self.inner.name())
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
        let _ = self.flush();
        self.inner.stop(deadline)
    }

    fn pending(&self) -> usize {
        self.buffered_count() + self.inner.pending()
    }
}

impl Drop for BufferedWriter {
    fn drop(&mut self) {
        // Best effort: a failed final flush must not panic in drop.
        let _ = self.flush();
    }
}
