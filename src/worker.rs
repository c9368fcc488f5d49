//! # Async Worker
//!
//! Bounded queue plus one background thread. Producers enqueue and return;
//! the worker drains batches into the inner writer, consults the adaptive
//! backpressure controller between batches, and honors a cooperative stop
//! token. Panics raised while writing a record are caught and counted; the
//! worker never dies on a record failure.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{LogError, Result};
use crate::overflow::{AdaptiveBackpressure, OverflowQueue};
use crate::record::LogRecord;
use crate::writer::LogWriter;

/// Cooperative cancellation signal checked by background threads between
/// batches and at queue-wait points.
#[derive(Clone)]
pub struct StopToken {
    inner: Arc<TokenState>,
}

struct TokenState {
    stopped: AtomicBool,
    deadline: Mutex<Option<Instant>>,
}

impl StopToken {
    pub fn new() -> Self {
        StopToken {
            inner: Arc::new(TokenState {
                stopped: AtomicBool::new(false),
                deadline: Mutex::new(None),
            }),
        }
    }

    /// Request a stop. An optional deadline bounds the shutdown drain;
    /// records still queued past it are dropped and counted.
    pub fn request_stop(&self, deadline: Option<Instant>) {
        *self.inner.deadline.lock() = deadline;
        self.inner.stopped.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    pub fn deadline(&self) -> Option<Instant> {
        *self.inner.deadline.lock()
    }
}

impl Default for StopToken {
    fn default() -> Self {
        StopToken::new()
    }
}

/// Background drain thread over an [`OverflowQueue`] of records.
pub struct AsyncWorker {
    queue: Arc<OverflowQueue<LogRecord>>,
    inner: Arc<Mutex<Box<dyn LogWriter>>>,
    backpressure: Arc<AdaptiveBackpressure>,
    token: StopToken,
    handle: Option<JoinHandle<usize>>,
    panicked: Arc<AtomicU64>,
    write_errors: Arc<AtomicU64>,
}

impl AsyncWorker {
    /// Spawn the worker thread. The inner writer is shared so the fatal
    /// emergency path and flush can reach it directly.
    pub fn spawn(
        queue: Arc<OverflowQueue<LogRecord>>,
        inner: Arc<Mutex<Box<dyn LogWriter>>>,
        backpressure: Arc<AdaptiveBackpressure>,
    ) -> Self {
        let token = StopToken::new();
        let panicked = Arc::new(AtomicU64::new(0));
        let write_errors = Arc::new(AtomicU64::new(0));

        let thread_queue = Arc::clone(&queue);
        let thread_inner = Arc::clone(&inner);
        let thread_bp = Arc::clone(&backpressure);
        let thread_token = token.clone();
        let thread_panicked = Arc::clone(&panicked);
        let thread_errors = Arc::clone(&write_errors);

        let handle = std::thread::Builder::new()
            .name("logpipe-worker".to_string())
            .spawn(move || {
                run_worker(
                    thread_queue,
                    thread_inner,
                    thread_bp,
                    thread_token,
                    thread_panicked,
                    thread_errors,
                )
            })
            .ok();

        AsyncWorker {
            queue,
            inner,
            backpressure,
            token,
            handle,
            panicked,
            write_errors,
        }
    }

    /// Thread-safe, non-blocking except under the block overflow policy.
    /// Returns whether the record was accepted.
    pub fn enqueue(&self, record: LogRecord) -> bool {
        self.queue.push(record)
    }

    /// Block until every record enqueued so far has been handed to the
    /// inner writer and its flush has returned.
    pub fn flush(&self, timeout: Duration) -> Result<()> {
        if !self.queue.wait_idle(timeout) {
            return Err(LogError::FlushTimeout(timeout));
        }
        self.inner.lock().flush()
    }

    /// Write synchronously through the shared inner writer, skipping the
    /// queue entirely. Fatal-record path.
    pub fn write_bypass(&self, record: &LogRecord) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.write(record)?;
        inner.flush()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn panicked_count(&self) -> u64 {
        self.panicked.load(Ordering::Relaxed)
    }

    pub fn write_error_count(&self) -> u64 {
        self.write_errors.load(Ordering::Relaxed)
    }

    pub fn queue(&self) -> &OverflowQueue<LogRecord> {
        &self.queue
    }

    pub fn backpressure(&self) -> &AdaptiveBackpressure {
        &self.backpressure
    }

    /// Stop the worker and join it. The remaining queue is drained unless
    /// the deadline expires first. Returns records abandoned at shutdown.
    /// Idempotent: a second call returns immediately.
    pub fn stop(&mut self, deadline: Option<Instant>) -> usize {
        self.token.request_stop(deadline);
        self.queue.stop();
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or(0),
            None => 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for AsyncWorker {
    fn drop(&mut self) {
        // Best effort: drain whatever is queued before the thread goes away.
        let _ = self.stop(Some(Instant::now() + Duration::from_secs(5)));
    }
}

fn run_worker(
    queue: Arc<OverflowQueue<LogRecord>>,
    inner: Arc<Mutex<Box<dyn LogWriter>>>,
    backpressure: Arc<AdaptiveBackpressure>,
    token: StopToken,
    panicked: Arc<AtomicU64>,
    write_errors: Arc<AtomicU64>,
) -> usize {
    let mut batch: Vec<LogRecord> = Vec::new();
    let mut dropped = 0usize;

    loop {
        let stopping = token.is_stopped();
        let wait = if stopping {
            Duration::ZERO
        } else {
            backpressure.flush_interval()
        };
        batch.clear();
        let drained = queue.pop_batch(&mut batch, backpressure.batch_size(), wait);

        if drained == 0 {
            if token.is_stopped() && queue.is_empty() {
                break;
            }
            // Idle tick: push buffered bytes down to the medium.
            flush_guarded(&inner, &panicked);
            continue;
        }

        if let Some(deadline) = token.deadline() {
            if Instant::now() >= deadline {
                dropped += drained;
                queue.complete(drained);
                dropped += queue.discard_remaining();
                break;
            }
        }

        let started = Instant::now();
        {
            let mut writer = inner.lock();
            for record in &batch {
                let outcome = catch_unwind(AssertUnwindSafe(|| writer.write(record)));
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => {
                        write_errors.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(_) => {
                        panicked.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
        queue.complete(drained);
        backpressure.update(queue.usage(), started.elapsed());
    }

    flush_guarded(&inner, &panicked);
    dropped
}

fn flush_guarded(inner: &Arc<Mutex<Box<dyn LogWriter>>>, panicked: &Arc<AtomicU64>) {
    let mut writer = inner.lock();
    if catch_unwind(AssertUnwindSafe(|| {
        let _ = writer.flush();
    }))
    .is_err()
    {
        panicked.fetch_add(1, Ordering::Relaxed);
    }
}
