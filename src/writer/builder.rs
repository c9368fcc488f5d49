//! Pipeline assembly. Starts from a terminal and wraps decorators outward;
//! the canonical order is sink, formatted, filtered, buffered, async, but
//! any order that respects the writer contract is accepted.

use std::path::Path;
use std::time::Duration;

use super::{
    AsyncWriter, BufferedWriter, EncryptedWriter, FilteredWriter, FormattedWriter, LogWriter,
    SinkWriter,
};
use crate::crypt::EncryptionConfig;
use crate::error::Result;
use crate::filter::LogFilter;
use crate::format::LogFormatter;
use crate::overflow::{BackpressureConfig, OverflowPolicy};
use crate::sink::{
    ConsoleSink, EncryptedFileSink, FileSink, NetworkConfig, NetworkSink, RotatingFileSink,
    RotationPolicy, Sink,
};

/// Fluent builder for one writer pipeline.
///
/// ```
/// use std::time::Duration;
/// use logpipe::format::JsonFormatter;
/// use logpipe::overflow::OverflowPolicy;
/// use logpipe::writer::PipelineBuilder;
///
/// let pipeline = PipelineBuilder::console()
///     .formatted(Box::new(JsonFormatter::new()))
///     .buffered(500, Duration::from_millis(200))
///     .asynchronous(8192, OverflowPolicy::DropOldest)
///     .build();
/// ```
pub struct PipelineBuilder {
    writer: Box<dyn LogWriter>,
}

impl PipelineBuilder {
    /// Start from an arbitrary terminal writer.
    pub fn from_writer(writer: Box<dyn LogWriter>) -> Self {
        PipelineBuilder { writer }
    }

    /// Start from an arbitrary byte sink.
    pub fn from_sink(sink: Box<dyn Sink>) -> Self {
        PipelineBuilder {
            writer: Box::new(SinkWriter::new(sink)),
        }
    }

    pub fn console() -> Self {
        Self::from_sink(Box::new(ConsoleSink::stdout()))
    }

    pub fn console_err() -> Self {
        Self::from_sink(Box::new(ConsoleSink::stderr()))
    }

    pub fn file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_sink(Box::new(FileSink::new(path)?)))
    }

    pub fn rotating_file(
        path: impl AsRef<Path>,
        policy: RotationPolicy,
        max_files: usize,
    ) -> Result<Self> {
        Ok(Self::from_sink(Box::new(
            RotatingFileSink::new(path, policy)?.with_max_files(max_files),
        )))
    }

    pub fn network(config: NetworkConfig) -> Self {
        Self::from_writer(Box::new(NetworkSink::new(config)))
    }

    pub fn encrypted_file(path: impl AsRef<Path>, config: EncryptionConfig) -> Result<Self> {
        Ok(Self::from_writer(Box::new(EncryptedFileSink::new(
            path, config,
        )?)))
    }

    pub fn formatted(self, formatter: Box<dyn LogFormatter>) -> Self {
        PipelineBuilder {
            writer: Box::new(FormattedWriter::new(formatter, self.writer)),
        }
    }

    pub fn filtered(self, filter: Box<dyn LogFilter>) -> Self {
        PipelineBuilder {
            writer: Box::new(FilteredWriter::new(filter, self.writer)),
        }
    }

    pub fn buffered(self, max_entries: usize, flush_interval: Duration) -> Self {
        PipelineBuilder {
            writer: Box::new(BufferedWriter::new(self.writer, max_entries, flush_interval)),
        }
    }

    pub fn asynchronous(self, queue_size: usize, policy: OverflowPolicy) -> Self {
        PipelineBuilder {
            writer: Box::new(AsyncWriter::new(self.writer, queue_size, policy)),
        }
    }

    pub fn asynchronous_with(
        self,
        queue_size: usize,
        policy: OverflowPolicy,
        backpressure: BackpressureConfig,
    ) -> Self {
        PipelineBuilder {
            writer: Box::new(AsyncWriter::with_backpressure(
                self.writer,
                queue_size,
                policy,
                backpressure,
            )),
        }
    }

    /// Encrypt records before they reach the remaining chain. Diagnostic
    /// mode; see [`EncryptedWriter`].
    pub fn encrypted(self, config: EncryptionConfig) -> Result<Self> {
        Ok(PipelineBuilder {
            writer: Box::new(EncryptedWriter::new(self.writer, config)?),
        })
    }

    pub fn build(self) -> Box<dyn LogWriter> {
        self.writer
    }
}
