//! # Collector
//!
//! Central fan-out: every materialized record is offered to the registered
//! pipelines (or the subset the router selected). Pipelines are independent;
//! one failing write never stops the others. Shutdown drains async stages
//! within a deadline and reports what could not be saved.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use crate::error::{LogError, Result};
use crate::metrics::LoggerMetrics;
use crate::record::LogRecord;
use crate::sink::SinkInfo;
use crate::writer::LogWriter;

struct Pipeline {
    name: String,
    writer: Mutex<Box<dyn LogWriter>>,
    errors: AtomicU64,
}

/// Which pipelines receive a record.
#[derive(Debug, Clone, Copy)]
pub enum DispatchSet<'a> {
    /// Every registered pipeline.
    All,
    /// Only the named pipelines.
    Named(&'a [String]),
    /// Every pipeline except the named ones (router default set).
    AllExcept(&'a [String]),
}

impl DispatchSet<'_> {
    fn includes(&self, name: &str) -> bool {
        match self {
            DispatchSet::All => true,
            DispatchSet::Named(names) => names.iter().any(|n| n == name),
            DispatchSet::AllExcept(names) => !names.iter().any(|n| n == name),
        }
    }
}

pub struct Collector {
    pipelines: RwLock<Vec<Pipeline>>,
    accepting: AtomicBool,
    metrics: Arc<LoggerMetrics>,
}

impl Collector {
    pub fn new(metrics: Arc<LoggerMetrics>) -> Self {
        Collector {
            pipelines: RwLock::new(Vec::new()),
            accepting: AtomicBool::new(true),
            metrics,
        }
    }

    /// Register a pipeline. `name` defaults to the pipeline's composed
    /// writer name; duplicates are rejected.
    pub fn add_writer(&self, name: Option<&str>, writer: Box<dyn LogWriter>) -> Result<()> {
        let name = name.map(String::from).unwrap_or_else(|| writer.name());
        let mut pipelines = self.pipelines.write();
        if pipelines.iter().any(|p| p.name == name) {
            return Err(LogError::InvalidArgument(format!(
                "duplicate writer name: '{}'",
                name
            )));
        }
        pipelines.push(Pipeline {
            name,
            writer: Mutex::new(writer),
            errors: AtomicU64::new(0),
        });
        Ok(())
    }

    /// Stop, drain and detach every pipeline.
    pub fn clear_writers(&self) {
        let mut pipelines = self.pipelines.write();
        for pipeline in pipelines.iter() {
            let mut writer = pipeline.writer.lock();
            let _ = writer.stop(Some(Instant::now() + Duration::from_secs(5)));
        }
        pipelines.clear();
    }

    pub fn writer_names(&self) -> Vec<String> {
        self.pipelines.read().iter().map(|p| p.name.clone()).collect()
    }

    pub fn writer_count(&self) -> usize {
        self.pipelines.read().len()
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::Release);
    }

    /// Per-pipeline error counters.
    pub fn error_counts(&self) -> Vec<(String, u64)> {
        self.pipelines
            .read()
            .iter()
            .map(|p| (p.name.clone(), p.errors.load(Ordering::Relaxed)))
            .collect()
    }

    /// Diagnostics for every pipeline.
    pub fn info(&self) -> Vec<SinkInfo> {
        self.pipelines
            .read()
            .iter()
            .map(|p| p.writer.lock().info())
            .collect()
    }

    /// Fan a record out to the selected pipelines. Failures are counted,
    /// never propagated to the producer.
    pub fn dispatch(&self, record: &LogRecord, selection: DispatchSet<'_>) {
        if !self.is_accepting() {
            LoggerMetrics::incr(&self.metrics.dropped);
            return;
        }
        let pipelines = self.pipelines.read();
        for pipeline in pipelines.iter() {
            if !selection.includes(&pipeline.name) {
                continue;
            }
            let mut writer = pipeline.writer.lock();
            if let Err(_e) = writer.write(record) {
                pipeline.errors.fetch_add(1, Ordering::Relaxed);
                LoggerMetrics::incr(&self.metrics.writer_errors);
            }
        }
    }

    /// Fatal-record path: write synchronously and flush each selected
    /// pipeline so the bytes reach the medium in the producer's frame.
    pub fn dispatch_emergency(&self, record: &LogRecord, selection: DispatchSet<'_>) {
        let pipelines = self.pipelines.read();
        for pipeline in pipelines.iter() {
            if !selection.includes(&pipeline.name) {
                continue;
            }
            let mut writer = pipeline.writer.lock();
            let outcome = writer.write(record).and_then(|_| writer.flush());
            if outcome.is_err() {
                pipeline.errors.fetch_add(1, Ordering::Relaxed);
                LoggerMetrics::incr(&self.metrics.writer_errors);
            }
        }
        LoggerMetrics::incr(&self.metrics.emergency_writes);
    }

    /// Flush every pipeline. Returns the first error after attempting all.
    pub fn flush_all(&self) -> Result<()> {
        let pipelines = self.pipelines.read();
        let mut first_error = None;
        for pipeline in pipelines.iter() {
            if let Err(e) = pipeline.writer.lock().flush() {
                pipeline.errors.fetch_add(1, Ordering::Relaxed);
                first_error.get_or_insert(e);
            }
        }
        LoggerMetrics::incr(&self.metrics.flushes);
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Start background resources on every pipeline.
    pub fn start_all(&self) -> Result<()> {
        let pipelines = self.pipelines.read();
        for pipeline in pipelines.iter() {
            pipeline.writer.lock().start().map_err(|e| {
                LogError::WriterInit(format!("{}: {}", pipeline.name, e))
            })?;
        }
        Ok(())
    }

    /// Stop accepting, drain async stages within the deadline, flush every
    /// sink. Records dropped past the deadline are summarized on stderr.
    /// Returns the dropped count.
    pub fn shutdown(&self, drain_timeout: Duration) -> usize {
        self.set_accepting(false);
        let deadline = Instant::now() + drain_timeout;
        let mut dropped = 0usize;
        {
            let pipelines = self.pipelines.read();
            for pipeline in pipelines.iter() {
                let mut writer = pipeline.writer.lock();
                match writer.stop(Some(deadline)) {
                    Ok(abandoned) => dropped += abandoned,
                    Err(_) => {
                        pipeline.errors.fetch_add(1, Ordering::Relaxed);
                    }
                }
                let _ = writer.flush();
            }
        }
        if dropped > 0 {
            LoggerMetrics::add(&self.metrics.dropped, dropped as u64);
            eprintln!(
                "logpipe: shutdown deadline expired, {} record(s) dropped",
                dropped
            );
        }
        dropped
    }
}
