use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::{LogWriter, WriterCapability};
use crate::error::{LogError, Result};
use crate::level::LogLevel;
use crate::overflow::{AdaptiveBackpressure, BackpressureConfig, OverflowPolicy, OverflowQueue};
use crate::record::LogRecord;
use crate::sink::SinkInfo;
use crate::worker::AsyncWorker;

/// Decorator that decouples producers from the inner writer with a bounded
/// queue and a background worker.
///
/// `write` enqueues a copy and returns immediately; the overflow policy
/// decides what happens on a full queue. Fatal records never touch the
/// queue: they go straight through the shared inner writer and are flushed
/// in the producer's frame so they survive a crash.
pub struct AsyncWriter {
    worker: AsyncWorker,
    name: String,
    flush_timeout: Duration,
    stopped: bool,
}

impl AsyncWriter {
    pub fn new(inner: Box<dyn LogWriter>, queue_size: usize, policy: OverflowPolicy) -> Self {
        AsyncWriter::with_backpressure(inner, queue_size, policy, BackpressureConfig::default())
    }

    pub fn with_backpressure(
        inner: Box<dyn LogWriter>,
        queue_size: usize,
        policy: OverflowPolicy,
        backpressure: BackpressureConfig,
    ) -> Self {
        let name = format!("async_{}", inner.name());
        let queue = Arc::new(OverflowQueue::new(queue_size, policy));
        let shared: Arc<Mutex<Box<dyn LogWriter>>> = Arc::new(Mutex::new(inner));
        let worker = AsyncWorker::spawn(
            queue,
            shared,
            Arc::new(AdaptiveBackpressure::new(backpressure)),
        );
        AsyncWriter {
            worker,
            name,
            flush_timeout: Duration::from_secs(30),
            stopped: false,
        }
    }

    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    pub fn dropped_count(&self) -> u64 {
        self.worker.queue().stats().dropped_count()
    }

    pub fn queue_len(&self) -> usize {
        self.worker.pending()
    }
}

impl LogWriter for AsyncWriter {
    fn write(&mut self, record: &LogRecord) -> Result<()> {
        if record.level() >= LogLevel::Fatal {
            return self.worker.write_bypass(record);
        }
        if self.stopped {
            // After stop the worker is gone; fall through synchronously so
            // late records are not silently lost.
            return self.worker.write_bypass(record);
        }
        if self.worker.enqueue(record.clone()) {
            Ok(())
        } else {
            Err(LogError::QueueFullDropped)
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.worker.flush(self.flush_timeout)
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn capability(&self) -> WriterCapability {
        WriterCapability::Async
    }

    fn info(&self) -> SinkInfo {
        SinkInfo {
            name: self.name.clone(),
            kind: "async",
            healthy: self.is_healthy(),
            detail: format!(
                "queued={} dropped={} panics={} write_errors={}",
                self.worker.pending(),
                self.dropped_count(),
                self.worker.panicked_count(),
                self.worker.write_error_count()
            ),
        }
    }

    fn stop(&mut self, deadline: Option<Instant>) -> Result<usize> {
        if self.stopped {
            return Ok(0);
        }
        self.stopped = true;
        Ok(self.worker.stop(deadline))
    }

    fn pending(&self) -> usize {
        self.worker.pending()
    }
}
