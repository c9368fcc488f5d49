//! # Writers
//!
//! The pipeline model: a linear chain of decorators terminating in a sink,
//! each node owning its inner node exclusively. Structure is fixed at build
//! time; only writes, flushes and lifecycle calls flow through it afterward.
//!
//! `name()` composes as `<decorator>[(<param>)]_<inner_name>` so a pipeline
//! is identifiable in diagnostics, e.g. `async_buffered(500)_formatted(json)_file`.

mod async_writer;
mod buffered;
mod builder;
mod encrypted;
mod filtered;
mod formatted;

pub use async_writer::AsyncWriter;
pub use buffered::BufferedWriter;
pub use builder::PipelineBuilder;
pub use encrypted::EncryptedWriter;
pub use filtered::FilteredWriter;
pub use formatted::FormattedWriter;

use std::time::Instant;

use crate::error::Result;
use crate::record::LogRecord;
use crate::sink::{Sink, SinkInfo};

/// Diagnostic classification of a writer node. Replaces a type hierarchy:
/// capabilities are data, not types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterCapability {
    /// Completes writes in the caller's frame.
    Sync,
    /// Enqueues and returns; a background worker commits.
    Async,
    /// Wraps an inner writer, adding behavior.
    Decorator,
    /// Fans out to several inner writers.
    Composite,
}

/// A node in a writer pipeline.
pub trait LogWriter: Send {
    /// Write a record. Decorators transform/forward; terminals commit.
    fn write(&mut self, record: &LogRecord) -> Result<()>;

    /// Write a record whose text has already been produced by an upstream
    /// formatter. Terminals commit `formatted`; decorators forward both.
    /// The default re-derives from the record for writers that own their
    /// serialization.
    fn write_preformatted(&mut self, record: &LogRecord, formatted: &str) -> Result<()> {
        let _ = formatted;
        self.write(record)
    }

    /// Flush this node and everything beneath it.
    fn flush(&mut self) -> Result<()>;

    fn is_healthy(&self) -> bool;

    fn name(&self) -> String;

    fn capability(&self) -> WriterCapability {
        WriterCapability::Sync
    }

    /// Diagnostics for the node (decorators report their terminal's info).
    fn info(&self) -> SinkInfo {
        SinkInfo {
            name: self.name(),
            kind: "writer",
            healthy: self.is_healthy(),
            detail: String::new(),
        }
    }

    /// Bring up background resources. Default: no-op.
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Stop background resources, draining queued records. Returns how many
    /// records were abandoned because the deadline expired.
    fn stop(&mut self, deadline: Option<Instant>) -> Result<usize> {
        let _ = deadline;
        Ok(0)
    }

    /// Queued-but-uncommitted records in this node and below.
    fn pending(&self) -> usize {
        0
    }
}

/// Terminal adapter turning a byte-oriented [`Sink`] into a [`LogWriter`].
///
/// A `SinkWriter` expects pre-formatted text; a bare `write` falls back to
/// the record's message so a pipeline without a formatter still produces
/// output.
pub struct SinkWriter {
    sink: Box<dyn Sink>,
}

impl SinkWriter {
    pub fn new(sink: Box<dyn Sink>) -> Self {
        SinkWriter { sink }
    }
}

impl LogWriter for SinkWriter {
    fn write(&mut self, record: &LogRecord) -> Result<()> {
        let mut line = String::with_capacity(record.message().len() + 1);
        line.push_str(record.message());
        line.push('\n');
        self.sink.write_raw(line.as_bytes())
    }

    fn write_preformatted(&mut self, _record: &LogRecord, formatted: &str) -> Result<()> {
        let mut line = String::with_capacity(formatted.len() + 1);
        line.push_str(formatted);
        line.push('\n');
        self.sink.write_raw(line.as_bytes())
    }

    fn flush(&mut self) -> Result<()> {
        self.sink.flush()
    }

    fn is_healthy(&self) -> bool {
        self.sink.is_healthy()
    }

    fn name(&self) -> String {
        self.sink.name()
    }

    fn info(&self) -> SinkInfo {
        self.sink.info()
    }

    fn start(&mut self) -> Result<()> {
        self.sink.start()
    }

    fn stop(&mut self, _deadline: Option<Instant>) -> Result<usize> {
        self.sink.stop()?;
        Ok(0)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared in-memory writer for decorator tests.

    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    /// Captures written lines for assertions.
    #[derive(Clone, Default)]
    pub struct CapturingWriter {
        pub lines: Arc<Mutex<Vec<String>>>,
        pub flushes: Arc<Mutex<usize>>,
        pub healthy: Arc<Mutex<bool>>,
    }

    impl CapturingWriter {
        pub fn new() -> Self {
            CapturingWriter {
                lines: Arc::new(Mutex::new(Vec::new())),
                flushes: Arc::new(Mutex::new(0)),
                healthy: Arc::new(Mutex::new(true)),
            }
        }

        pub fn captured(&self) -> Vec<String> {
            self.lines.lock().clone()
        }

        pub fn flush_count(&self) -> usize {
            *self.flushes.lock()
        }
    }

    impl LogWriter for CapturingWriter {
        fn write(&mut self, record: &LogRecord) -> Result<()> {
            self.lines.lock().push(record.message().to_string());
            Ok(())
        }

        fn write_preformatted(&mut self, _record: &LogRecord, formatted: &str) -> Result<()> {
            self.lines.lock().push(formatted.to_string());
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            *self.flushes.lock() += 1;
            Ok(())
        }

        fn is_healthy(&self) -> bool {
            *self.healthy.lock()
        }

        fn name(&self) -> String {
            "capture".to_string()
        }
    }
}
