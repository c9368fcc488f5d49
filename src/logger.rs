//! # Core Logger
//!
//! Public entry API: the minimum-level gate, sampling, record
//! materialization with context merge, routing, and hand-off to the
//! collector. Producer calls never panic and never block beyond the
//! documented decorator internals; failures become metric counters.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;

use crate::collect::{Collector, DispatchSet};
use crate::config::LoggerConfig;
use crate::context;
use crate::emergency::EmergencyRing;
use crate::error::{LogError, Result};
use crate::format::{JsonFormatter, LogFormatter, TimestampFormatter};
use crate::level::LogLevel;
use crate::metrics::{LoggerMetrics, MetricsSnapshot};
use crate::overflow::BackpressureConfig;
use crate::record::{FieldValue, LogRecord, SourceLocation};
use crate::route::{LogRouter, RouteDecision};
use crate::sample::LogSampler;
use crate::sink::{NetworkConfig, RotationPolicy};
use crate::writer::{LogWriter, PipelineBuilder};

/// Drain budget applied by [`Logger::stop`].
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Router plus its pre-computed claimed-writer set, swapped as one unit so
/// the default-set computation never happens on the hot path.
struct RouterSlot {
    router: LogRouter,
    claimed: Vec<String>,
}

pub struct Logger {
    level: AtomicU8,
    config: LoggerConfig,
    collector: Arc<Collector>,
    router: ArcSwapOption<RouterSlot>,
    sampler: ArcSwapOption<LogSampler>,
    metrics: Arc<LoggerMetrics>,
    emergency: Option<Arc<EmergencyRing>>,
    emergency_formatter: TimestampFormatter,
    running: AtomicBool,
}

impl Logger {
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::new()
    }

    /// Construct a logger with no writers attached yet.
    pub fn new(config: LoggerConfig) -> Result<Self> {
        config.validate()?;
        let metrics = Arc::new(LoggerMetrics::default());
        let emergency = config
            .enable_crash_handler
            .then(|| Arc::new(EmergencyRing::new(64 * 1024)));
        Ok(Logger {
            level: AtomicU8::new(config.min_level as u8),
            collector: Arc::new(Collector::new(Arc::clone(&metrics))),
            router: ArcSwapOption::empty(),
            sampler: ArcSwapOption::empty(),
            metrics,
            emergency,
            emergency_formatter: TimestampFormatter::new(),
            running: AtomicBool::new(true),
            config,
        })
    }

    // ---- level gate -----------------------------------------------------

    /// Hot-path check: true when `level` clears the current minimum.
    #[inline]
    pub fn is_enabled(&self, level: LogLevel) -> bool {
        level != LogLevel::Off && level as u8 >= self.level.load(Ordering::Relaxed)
    }

    pub fn set_level(&self, level: LogLevel) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    pub fn get_level(&self) -> LogLevel {
        LogLevel::from_u8(self.level.load(Ordering::Relaxed))
    }

    // ---- writer management ----------------------------------------------

    /// Register a pipeline under an optional explicit name. Rejects
    /// duplicates. The pipeline is started when the logger is running.
    pub fn add_writer(&self, name: Option<&str>, mut writer: Box<dyn LogWriter>) -> Result<()> {
        if self.running.load(Ordering::Acquire) {
            writer.start()?;
        }
        self.collector.add_writer(name, writer)
    }

    /// Drain and detach every pipeline.
    pub fn clear_writers(&self) {
        self.collector.clear_writers();
    }

    pub fn writer_names(&self) -> Vec<String> {
        self.collector.writer_names()
    }

    pub fn writer_errors(&self) -> Vec<(String, u64)> {
        self.collector.error_counts()
    }

    pub fn set_router(&self, router: Option<LogRouter>) {
        match router {
            Some(router) => {
                let claimed = router.claimed_writers();
                self.router
                    .store(Some(Arc::new(RouterSlot { router, claimed })));
            }
            None => self.router.store(None),
        }
    }

    pub fn set_sampler(&self, sampler: Option<LogSampler>) {
        self.sampler.store(sampler.map(Arc::new));
    }

    /// Current sampler, for stats inspection.
    pub fn sampler(&self) -> Option<Arc<LogSampler>> {
        self.sampler.load_full()
    }

    // ---- lifecycle ------------------------------------------------------

    /// Transition async pipelines to running. Idempotent.
    pub fn start(&self) -> Result<()> {
        if !self.running.swap(true, Ordering::AcqRel) {
            self.collector.set_accepting(true);
            self.collector.start_all()?;
        }
        Ok(())
    }

    /// Stop with the default drain budget. Idempotent: later calls return
    /// immediately without error.
    pub fn stop(&self) -> Result<()> {
        self.stop_within(DEFAULT_DRAIN_TIMEOUT)
    }

    /// Stop, bounding the shutdown drain. Records still queued past the
    /// deadline are dropped, counted, and summarized on stderr.
    pub fn stop_within(&self, drain_timeout: Duration) -> Result<()> {
        if !self.running.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        self.collector.shutdown(drain_timeout);
        Ok(())
    }

    /// Block until every enqueued record has been handed to its sink and
    /// each sink's flush has returned.
    pub fn flush(&self) -> Result<()> {
        self.collector.flush_all()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    // ---- context --------------------------------------------------------

    pub fn set_context(&self, key: &str, value: impl Into<FieldValue>) {
        context::with_context(|ctx| ctx.set(key, value, context::ContextCategory::Custom));
    }

    pub fn set_context_trace(&self, trace_id: &str, span_id: &str, parent_span_id: Option<&str>) {
        context::with_context(|ctx| ctx.set_trace(trace_id, span_id, parent_span_id));
    }

    pub fn set_context_request(&self, request_id: &str, correlation_id: Option<&str>) {
        context::with_context(|ctx| ctx.set_request(request_id, correlation_id));
    }

    pub fn get_context(&self, key: &str) -> Option<FieldValue> {
        context::with_context(|ctx| ctx.get(key).cloned())
    }

    pub fn remove_context(&self, key: &str) {
        context::with_context(|ctx| {
            ctx.remove(key);
        });
    }

    pub fn clear_context(&self) {
        context::with_context(|ctx| ctx.clear());
    }

    // ---- producer API ---------------------------------------------------

    /// Log a plain message. Never fails into the producer.
    pub fn log(&self, level: LogLevel, message: &str) {
        let _ = self.submit(level, message, SubmitExtras::default());
    }

    /// Log with a captured source location.
    pub fn log_at(&self, level: LogLevel, message: &str, location: SourceLocation) {
        let _ = self.submit(
            level,
            message,
            SubmitExtras {
                location: Some(location),
                ..SubmitExtras::default()
            },
        );
    }

    /// Log with structured fields and an optional source location.
    pub fn log_with(
        &self,
        level: LogLevel,
        message: &str,
        fields: &[(&str, FieldValue)],
        location: Option<SourceLocation>,
    ) {
        let mut extras = SubmitExtras {
            location,
            ..SubmitExtras::default()
        };
        for (key, value) in fields {
            extras
                .fields
                .push((crate::record::SmallStr32::from(*key), value.clone()));
        }
        let _ = self.submit(level, message, extras);
    }

    /// Result-returning variant for callers that opt into error handling.
    pub fn try_log(&self, level: LogLevel, message: &str) -> Result<()> {
        self.submit(level, message, SubmitExtras::default())
    }

    pub fn trace(&self, message: &str) {
        self.log(LogLevel::Trace, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warning, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }

    pub fn fatal(&self, message: &str) {
        self.log(LogLevel::Fatal, message);
    }

    /// Record builder for chained field additions, finished by `emit()`.
    pub fn structured(&self, level: LogLevel, message: &str) -> StructuredLog<'_> {
        StructuredLog {
            logger: self,
            level,
            message: message.to_string(),
            extras: SubmitExtras::default(),
        }
    }

    // ---- emergency accessors -------------------------------------------

    /// Signal-safe emergency descriptor, when the crash handler is enabled.
    pub fn emergency_fd(&self) -> Option<i32> {
        self.emergency.as_ref().map(|ring| ring.emergency_fd())
    }

    /// Signal-safe pointer to the emergency ring.
    pub fn emergency_buffer_ptr(&self) -> Option<*const u8> {
        self.emergency.as_ref().map(|ring| ring.buffer_ptr())
    }

    /// Signal-safe emergency ring size.
    pub fn emergency_buffer_len(&self) -> Option<usize> {
        self.emergency.as_ref().map(|ring| ring.buffer_len())
    }

    /// Ordered copy of the emergency ring, for diagnostics.
    pub fn emergency_snapshot(&self) -> Option<Vec<u8>> {
        self.emergency.as_ref().map(|ring| ring.snapshot())
    }

    // ---- ingestion ------------------------------------------------------

    fn submit(&self, level: LogLevel, message: &str, extras: SubmitExtras) -> Result<()> {
        if self.config.enable_metrics {
            LoggerMetrics::incr(&self.metrics.submitted);
        }
        // Gate first: rejected records allocate nothing.
        if !self.is_enabled(level) {
            LoggerMetrics::incr(&self.metrics.gated_out);
            return Ok(());
        }

        let mut builder = LogRecord::builder(level, message);
        if let Some(location) = extras.location {
            builder = builder.location(location);
        }
        if let Some(category) = extras.category {
            builder = builder.category(&category);
        }
        builder = builder.fields(extras.fields);

        let structured = self.config.enable_structured_logging;
        if structured {
            if let Some(trace) = context::with_context(|ctx| ctx.trace_context()) {
                builder = builder.trace(trace);
            }
        }

        // Sampler verdict before the context merge; fatal never samples.
        if level < LogLevel::Fatal {
            if let Some(sampler) = self.sampler.load().as_ref() {
                if !sampler.should_sample(builder.peek()) {
                    LoggerMetrics::incr(&self.metrics.sampled_out);
                    return Ok(());
                }
            }
        }

        if structured {
            let context_fields = context::with_context(|ctx| ctx.snapshot_fields());
            builder = builder.fields(context_fields);
        }
        let record = builder.build();

        if level >= LogLevel::Fatal {
            self.write_emergency(&record);
            return Ok(());
        }

        if let Some(ring) = &self.emergency {
            ring.append(self.emergency_formatter.format(&record).as_bytes());
        }

        match self.router.load().as_ref() {
            Some(slot) if slot.router.has_routes() => match slot.router.route(&record) {
                RouteDecision::Writers(names) => {
                    self.collector.dispatch(&record, DispatchSet::Named(&names));
                }
                RouteDecision::Default => {
                    self.collector
                        .dispatch(&record, DispatchSet::AllExcept(&slot.claimed));
                }
            },
            _ => self.collector.dispatch(&record, DispatchSet::All),
        }
        Ok(())
    }

    /// Fatal path: ring first, then synchronous write-and-flush on every
    /// pipeline, bypassing routing and async queues.
    fn write_emergency(&self, record: &LogRecord) {
        if let Some(ring) = &self.emergency {
            ring.append(self.emergency_formatter.format(record).as_bytes());
        }
        self.collector.dispatch_emergency(record, DispatchSet::All);
    }
}

impl Drop for Logger {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[derive(Default)]
struct SubmitExtras {
    fields: crate::record::FieldList,
    location: Option<SourceLocation>,
    category: Option<String>,
}

/// Chained field builder returned by [`Logger::structured`].
///
/// ```no_run
/// # let logger = logpipe::Logger::new(logpipe::config::LoggerConfig::default()).unwrap();
/// logger
///     .structured(logpipe::level::LogLevel::Info, "request served")
///     .field("status", 200)
///     .field("duration_ms", 12.8)
///     .emit();
/// ```
pub struct StructuredLog<'a> {
    logger: &'a Logger,
    level: LogLevel,
    message: String,
    extras: SubmitExtras,
}

impl StructuredLog<'_> {
    pub fn field(mut self, key: &str, value: impl Into<FieldValue>) -> Self {
        self.extras
            .fields
            .push((crate::record::SmallStr32::from(key), value.into()));
        self
    }

    pub fn category(mut self, category: &str) -> Self {
        self.extras.category = Some(category.to_string());
        self
    }

    pub fn location(mut self, location: SourceLocation) -> Self {
        self.extras.location = Some(location);
        self
    }

    /// Submit through the fast path. Never fails into the producer.
    pub fn emit(self) {
        let _ = self.logger.submit(self.level, &self.message, self.extras);
    }

    /// Submit, surfacing errors to callers that opted in.
    pub fn try_emit(self) -> Result<()> {
        self.logger.submit(self.level, &self.message, self.extras)
    }
}

/// Assembles a configured [`Logger`]: config, writers, router, sampler.
pub struct LoggerBuilder {
    config: LoggerConfig,
    writers: Vec<(Option<String>, Box<dyn LogWriter>)>,
    router: Option<LogRouter>,
    sampler: Option<LogSampler>,
}

impl LoggerBuilder {
    pub fn new() -> Self {
        LoggerBuilder {
            config: LoggerConfig::default(),
            writers: Vec::new(),
            router: None,
            sampler: None,
        }
    }

    pub fn with_config(mut self, config: LoggerConfig) -> Self {
        self.config = config;
        self
    }

    /// Start from the `LOG_ENV` / `LOG_LEVEL` environment mapping.
    pub fn from_env(mut self) -> Self {
        self.config = LoggerConfig::from_env();
        self
    }

    pub fn min_level(mut self, level: LogLevel) -> Self {
        self.config.min_level = level;
        self
    }

    /// Set the rotation threshold from a human-readable size string
    /// ("500B", "5KB", "10MB", "1GB").
    pub fn max_file_size(mut self, size: &str) -> Result<Self> {
        self.config.max_file_size =
            crate::config::parse_size_limit(size).ok_or_else(|| {
                LogError::InvalidConfiguration(format!("invalid max_file_size: '{}'", size))
            })?;
        Ok(self)
    }

    pub fn add_writer(mut self, name: &str, writer: Box<dyn LogWriter>) -> Self {
        self.writers.push((Some(name.to_string()), writer));
        self
    }

    pub fn add_writer_unnamed(mut self, writer: Box<dyn LogWriter>) -> Self {
        self.writers.push((None, writer));
        self
    }

    /// Console pipeline derived from the config: human-readable lines,
    /// color per `enable_color`.
    pub fn with_console_writer(mut self) -> Self {
        let formatter = TimestampFormatter::with_color(self.config.enable_color);
        self.writers.push((
            Some("console".to_string()),
            PipelineBuilder::console()
                .formatted(Box::new(formatter))
                .build(),
        ));
        self
    }

    /// Rotating-file pipeline derived from the config: JSON lines under
    /// `log_directory/log_file_prefix.log`, rotated at `max_file_size`
    /// keeping `max_file_count` backups, async behind the configured queue
    /// and overflow policy.
    pub fn with_file_writer(mut self) -> Result<Self> {
        let path = self
            .config
            .log_directory
            .join(format!("{}.log", self.config.log_file_prefix));
        let defaults = BackpressureConfig::default();
        let backpressure = BackpressureConfig {
            min_batch_size: defaults.min_batch_size.min(self.config.batch_size),
            max_batch_size: defaults.max_batch_size.max(self.config.batch_size),
            initial_batch_size: self.config.batch_size,
            min_flush_interval: defaults.min_flush_interval.min(self.config.flush_interval),
            max_flush_interval: defaults.max_flush_interval.max(self.config.flush_interval),
            initial_flush_interval: self.config.flush_interval,
            ..defaults
        };
        let pipeline = PipelineBuilder::rotating_file(
            &path,
            RotationPolicy::Size(self.config.max_file_size),
            self.config.max_file_count,
        )?
        .formatted(Box::new(JsonFormatter::new()))
        .asynchronous_with(
            self.config.queue_size,
            self.config.overflow_policy,
            backpressure,
        )
        .build();
        self.writers.push((Some("file".to_string()), pipeline));
        Ok(self)
    }

    /// Network pipeline from `remote_host`, `remote_port` and
    /// `network_timeout`.
    pub fn with_network_writer(mut self) -> Result<Self> {
        let host = self.config.remote_host.clone().ok_or_else(|| {
            LogError::InvalidConfiguration("remote_host required for the network writer".into())
        })?;
        let mut net = NetworkConfig::tcp(&host, self.config.remote_port);
        net.connect_timeout = self.config.network_timeout;
        net.queue_capacity = self.config.queue_size;
        self.writers
            .push((Some("network".to_string()), PipelineBuilder::network(net).build()));
        Ok(self)
    }

    /// Encrypted-file pipeline from the config's encryption section,
    /// written to `log_directory/log_file_prefix.log.enc`.
    pub fn with_encrypted_file_writer(mut self) -> Result<Self> {
        let encryption = self.config.encryption.clone().ok_or_else(|| {
            LogError::InvalidConfiguration(
                "encryption settings required for the encrypted writer".into(),
            )
        })?;
        let path = self
            .config
            .log_directory
            .join(format!("{}.log.enc", self.config.log_file_prefix));
        let pipeline = PipelineBuilder::encrypted_file(&path, encryption)?.build();
        self.writers
            .push((Some("encrypted_file".to_string()), pipeline));
        Ok(self)
    }

    pub fn with_router(mut self, router: LogRouter) -> Self {
        self.router = Some(router);
        self
    }

    pub fn with_sampler(mut self, sampler: LogSampler) -> Self {
        self.sampler = Some(sampler);
        self
    }

    /// Validate, attach writers, start pipelines.
    pub fn build(self) -> Result<Logger> {
        let logger = Logger::new(self.config)?;
        for (name, writer) in self.writers {
            logger.add_writer(name.as_deref(), writer)?;
        }
        logger.set_router(self.router);
        if let Some(sampler) = self.sampler {
            logger.set_sampler(Some(sampler));
        }
        Ok(logger)
    }
}

impl Default for LoggerBuilder {
    fn default() -> Self {
        LoggerBuilder::new()
    }
}
