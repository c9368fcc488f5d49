use std::sync::Arc;
use std::time::Duration;

use crate::format::JsonFormatter;
use crate::level::LogLevel;
use crate::logger::Logger;
use crate::overflow::OverflowPolicy;
use crate::writer::PipelineBuilder;

#[cfg(test)]
mod end_to_end {
    use super::*;

    #[test]
    fn test_json_file_pipeline_single_line() {
        // S1 shape, against a file sink (same byte contract as console).
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s1.log");
        let logger = Logger::builder()
            .min_level(LogLevel::Info)
            .add_writer(
                "json_file",
                PipelineBuilder::file(&path)
                    .unwrap()
                    .formatted(Box::new(JsonFormatter::new()))
                    .build(),
            )
            .build()
            .unwrap();

        logger.info("hello");
        logger.flush().unwrap();
        logger.stop().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 1);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["level"], "INFO");
        assert_eq!(parsed["message"], "hello");
    }

    #[test]
    fn test_console_pipeline_smoke() {
        let logger = Logger::builder()
            .min_level(LogLevel::Info)
            .add_writer(
                "console",
                PipelineBuilder::console_err()
                    .formatted(Box::new(JsonFormatter::new()))
                    .build(),
            )
            .build()
            .unwrap();
        logger.info("console smoke");
        logger.flush().unwrap();
        logger.stop().unwrap();
    }

    #[test]
    fn test_async_pipeline_survives_stop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("async.log");
        let logger = Logger::builder()
            .min_level(LogLevel::Trace)
            .add_writer(
                "async_file",
                PipelineBuilder::file(&path)
                    .unwrap()
                    .formatted(Box::new(JsonFormatter::new()))
                    .asynchronous(4096, OverflowPolicy::DropOldest)
                    .build(),
            )
            .build()
            .unwrap();

        for i in 0..500 {
            logger.info(&format!("async message {}", i));
        }
        logger.stop().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 500);
    }

    #[test]
    fn test_per_thread_order_preserved_in_pipeline() {
        // Invariant: records from one producer reach the terminal sink in
        // submission order, even with many producers interleaved.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("order.log");
        let logger = Arc::new(
            Logger::builder()
                .min_level(LogLevel::Trace)
                .add_writer(
                    "ordered",
                    PipelineBuilder::file(&path)
                        .unwrap()
                        .formatted(Box::new(JsonFormatter::new()))
                        .asynchronous(65_536, OverflowPolicy::Block {
                            timeout: Duration::from_secs(5),
                        })
                        .build(),
                )
                .build()
                .unwrap(),
        );

        let mut handles = Vec::new();
        for thread_index in 0..4 {
            let logger = Arc::clone(&logger);
            handles.push(std::thread::spawn(move || {
                for i in 0..250 {
                    logger
                        .structured(LogLevel::Info, "ordered")
                        .field("producer", thread_index as i64)
                        .field("seq", i as i64)
                        .emit();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        logger.stop().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut last_seq = [-1i64; 4];
        let mut total = 0;
        for line in content.lines() {
            let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
            let producer = parsed["producer"].as_i64().unwrap() as usize;
            let seq = parsed["seq"].as_i64().unwrap();
            assert!(
                seq > last_seq[producer],
                "producer {} went backwards: {} after {}",
                producer,
                seq,
                last_seq[producer]
            );
            last_seq[producer] = seq;
            total += 1;
        }
        assert_eq!(total, 1000);
    }

    #[test]
    fn test_gated_records_touch_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gated.log");
        let logger = Logger::builder()
            .min_level(LogLevel::Error)
            .add_writer(
                "gated",
                PipelineBuilder::file(&path)
                    .unwrap()
                    .formatted(Box::new(JsonFormatter::new()))
                    .build(),
            )
            .build()
            .unwrap();
        for _ in 0..100 {
            logger.debug("noise");
        }
        logger.flush().unwrap();
        logger.stop().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
        let metrics = logger.metrics();
        assert_eq!(metrics.gated_out, 100);
    }
}
