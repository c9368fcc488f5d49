use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::Result;
use crate::level::LogLevel;
use crate::overflow::OverflowPolicy;
use crate::record::LogRecord;
use crate::writer::testing::CapturingWriter;
use crate::writer::{AsyncWriter, LogWriter, PipelineBuilder};

/// Writer whose writes block while the test holds the gate. Lets tests
/// freeze the async worker mid-batch deterministically.
#[derive(Clone)]
struct GatedWriter {
    gate: Arc<Mutex<()>>,
    inner: CapturingWriter,
}

impl GatedWriter {
    fn new(gate: Arc<Mutex<()>>) -> (Self, CapturingWriter) {
        let inner = CapturingWriter::new();
        (
            GatedWriter {
                gate,
                inner: inner.clone(),
            },
            inner,
        )
    }
}

impl LogWriter for GatedWriter {
    fn write(&mut self, record: &LogRecord) -> Result<()> {
        let _held = self.gate.lock();
        self.inner.write(record)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn name(&self) -> String {
        "gated".to_string()
    }
}

fn record(message: &str) -> LogRecord {
    LogRecord::builder(LogLevel::Info, message).build()
}

#[test]
fn test_drop_newest_overflow_accounting() {
    // S4: queue_size=4, drop-newest, worker paused. 1000 producer writes:
    // exactly 4 delivered after resume (plus the plug), 996 dropped.
    let gate = Arc::new(Mutex::new(()));
    let (gated, capture) = GatedWriter::new(Arc::clone(&gate));
    let mut writer = AsyncWriter::new(Box::new(gated), 4, OverflowPolicy::DropNewest);

    let held = gate.lock();
    writer.write(&record("plug")).unwrap();
    // Wait until the worker has pulled the plug record and is blocked
    // inside the gated write.
    let deadline = Instant::now() + Duration::from_secs(5);
    while writer.queue_len() != 0 {
        assert!(Instant::now() < deadline, "worker never picked up the plug");
        std::thread::sleep(Duration::from_millis(1));
    }

    let mut accepted = 0;
    for i in 0..1000 {
        if writer.write(&record(&format!("r{}", i))).is_ok() {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 4);
    assert_eq!(writer.dropped_count(), 996);

    drop(held);
    writer.flush().unwrap();
    let lines = capture.captured();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0], "plug");
    assert_eq!(&lines[1..], &["r0", "r1", "r2", "r3"]);
    writer.stop(None).unwrap();
}

#[test]
fn test_block_policy_enqueue_bounded_by_timeout() {
    // Invariant: with block policy and timeout T, enqueue returns within T
    // even under permanent blockage.
    let gate = Arc::new(Mutex::new(()));
    let (gated, _capture) = GatedWriter::new(Arc::clone(&gate));
    let timeout = Duration::from_millis(100);
    let mut writer = AsyncWriter::new(Box::new(gated), 1, OverflowPolicy::Block { timeout });

    let held = gate.lock();
    writer.write(&record("plug")).unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while writer.queue_len() != 0 {
        assert!(Instant::now() < deadline);
        std::thread::sleep(Duration::from_millis(1));
    }
    writer.write(&record("fills queue")).unwrap();

    let started = Instant::now();
    let outcome = writer.write(&record("must time out"));
    let elapsed = started.elapsed();
    assert!(outcome.is_err());
    assert!(elapsed >= timeout);
    assert!(elapsed < timeout + Duration::from_secs(1));

    drop(held);
    writer.stop(None).unwrap();
}

#[test]
fn test_full_decorator_stack_delivers() {
    let capture = CapturingWriter::new();
    let mut pipeline = PipelineBuilder::from_writer(Box::new(capture.clone()))
        .formatted(Box::new(crate::format::LogfmtFormatter::new()))
        .filtered(Box::new(crate::filter::LevelFilter::new(LogLevel::Info)))
        .buffered(10, Duration::from_secs(3600))
        .asynchronous(1024, OverflowPolicy::DropOldest)
        .build();

    for i in 0..25 {
        pipeline
            .write(&record(&format!("stacked {}", i)))
            .unwrap();
    }
    let debug_record = LogRecord::builder(LogLevel::Debug, "filtered out").build();
    pipeline.write(&debug_record).unwrap();
    pipeline.flush().unwrap();
    pipeline.stop(None).unwrap();

    let lines = capture.captured();
    assert_eq!(lines.len(), 25);
    assert!(lines[0].contains("msg=\"stacked 0\""));
    assert!(lines.iter().all(|l| !l.contains("filtered out")));
}

#[test]
fn test_grow_policy_counts_growth() {
    let gate = Arc::new(Mutex::new(()));
    let (gated, _inner) = GatedWriter::new(Arc::clone(&gate));
    let mut writer = AsyncWriter::new(
        Box::new(gated),
        2,
        OverflowPolicy::Grow {
            growth_factor: 1,
            max_total_size: 8,
        },
    );

    let held = gate.lock();
    writer.write(&record("plug")).unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while writer.queue_len() != 0 {
        assert!(Instant::now() < deadline);
        std::thread::sleep(Duration::from_millis(1));
    }
    for i in 0..8 {
        writer.write(&record(&format!("g{}", i))).unwrap();
    }
    // Capacity is exhausted at 8; the next record drops.
    assert!(writer.write(&record("overflow")).is_err());
    drop(held);
    writer.stop(None).unwrap();
}
