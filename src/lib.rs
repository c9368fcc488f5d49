//! # logpipe - High-Throughput Structured Logging
//!
//! Thread-safe structured logging built around composable writer pipelines.
//! Producers submit records at high rates; the engine gates, samples,
//! routes and fans them out to heterogeneous sinks without blocking the
//! producer in the common case.
//!
//! ## Architecture
//!
//! - `logger`: public entry API, level gate, metrics, emergency path
//! - `collect`: multi-writer fan-out and shutdown drain
//! - `writer`: decorator pipeline (filtered, formatted, buffered, async,
//!   encrypted) over terminal sinks
//! - `sink`: console, file, rotating-file, network, encrypted-file
//! - `format`: timestamp, JSON, logfmt, template formatters
//! - `sample` / `route`: volume reduction and rule-based dispatch
//! - `overflow` / `worker`: bounded queues, overflow policies, adaptive
//!   backpressure, background workers
//! - `context`: per-thread unified context for distributed tracing
//!
//! ## Example
//!
//! ```
//! use logpipe::format::JsonFormatter;
//! use logpipe::level::LogLevel;
//! use logpipe::writer::PipelineBuilder;
//! use logpipe::Logger;
//!
//! let logger = Logger::builder()
//!     .min_level(LogLevel::Info)
//!     .add_writer(
//!         "console",
//!         PipelineBuilder::console()
//!             .formatted(Box::new(JsonFormatter::new()))
//!             .build(),
//!     )
//!     .build()
//!     .unwrap();
//!
//! logger.info("hello");
//! logger.flush().unwrap();
//! logger.stop().unwrap();
//! ```

pub mod collect;
pub mod config;
pub mod context;
pub mod crypt;
pub mod emergency;
pub mod error;
pub mod filter;
pub mod format;
pub mod level;
pub mod logger;
pub mod metrics;
pub mod overflow;
pub mod record;
pub mod route;
pub mod sample;
pub mod sink;
pub mod worker;
pub mod writer;

pub use error::{LogError, Result};
pub use level::LogLevel;
pub use logger::{Logger, LoggerBuilder};
pub use record::{FieldValue, LogRecord, SourceLocation, TraceContext};

#[cfg(test)]
mod tests;
