//! Logger performance counters. All updates are relaxed atomics; the hot
//! path never takes a lock to account for a record.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters owned by the logger and shared with its writers.
#[derive(Debug, Default)]
pub struct LoggerMetrics {
    /// Records submitted through the public API.
    pub submitted: AtomicU64,
    /// Records rejected by the minimum-level gate.
    pub gated_out: AtomicU64,
    /// Records dropped by the sampler.
    pub sampled_out: AtomicU64,
    /// Records dropped by overflow policies or shutdown deadlines.
    pub dropped: AtomicU64,
    /// Write failures across all pipelines.
    pub writer_errors: AtomicU64,
    /// Bytes committed by sinks that report sizes.
    pub bytes_written: AtomicU64,
    /// Explicit flush operations completed.
    pub flushes: AtomicU64,
    /// Fatal records routed through the synchronous emergency path.
    pub emergency_writes: AtomicU64,
}

impl LoggerMetrics {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, amount: u64) {
        counter.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            gated_out: self.gated_out.load(Ordering::Relaxed),
            sampled_out: self.sampled_out.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            writer_errors: self.writer_errors.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            emergency_writes: self.emergency_writes.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.submitted.store(0, Ordering::Relaxed);
        self.gated_out.store(0, Ordering::Relaxed);
        self.sampled_out.store(0, Ordering::Relaxed);
        self.dropped.store(0, Ordering::Relaxed);
        self.writer_errors.store(0, Ordering::Relaxed);
        self.bytes_written.store(0, Ordering::Relaxed);
        self.flushes.store(0, Ordering::Relaxed);
        self.emergency_writes.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time copy of the counters, serializable for diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub submitted: u64,
    pub gated_out: u64,
    pub sampled_out: u64,
    pub dropped: u64,
    pub writer_errors: u64,
    pub bytes_written: u64,
    pub flushes: u64,
    pub emergency_writes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_and_reset() {
        let metrics = LoggerMetrics::default();
        LoggerMetrics::incr(&metrics.submitted);
        LoggerMetrics::incr(&metrics.submitted);
        LoggerMetrics::add(&metrics.bytes_written, 128);

        let snap = metrics.snapshot();
        assert_eq!(snap.submitted, 2);
        assert_eq!(snap.bytes_written, 128);

        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_snapshot_serializes() {
        let snap = MetricsSnapshot {
            submitted: 5,
            ..MetricsSnapshot::default()
        };
        let json = serde_json::to_string(&snap).unwrap();
        assert!(json.contains("\"submitted\":5"));
    }
}
