use std::time::Instant;

use super::{LogWriter, WriterCapability};
use crate::error::Result;
use crate::format::LogFormatter;
use crate::record::LogRecord;
use crate::sink::SinkInfo;

/// Decorator that renders records through its formatter.
///
/// Two flows exist, both supported: when the inner node is a terminal
/// (capability `Sync`), the formatter output is handed down as the
/// pre-formatted text; when the inner node is another decorator or an async
/// stage, the record flows through unchanged so formatting can happen in a
/// stage composed closer to the sink.
pub struct FormattedWriter {
    formatter: Box<dyn LogFormatter>,
    inner: Box<dyn LogWriter>,
}

impl FormattedWriter {
    pub fn new(formatter: Box<dyn LogFormatter>, inner: Box<dyn LogWriter>) -> Self {
        FormattedWriter { formatter, inner }
    }
}

impl LogWriter for FormattedWriter {
    fn write(&mut self, record: &LogRecord) -> Result<()> {
        match self.inner.capability() {
            WriterCapability::Sync => {
                let text = self.formatter.format(record);
                self.inner.write_preformatted(record, &text)
            }
            _ => self.inner.write(record),
        }
    }

    fn write_preformatted(&mut self, record: &LogRecord, formatted: &str) -> Result<()> {
        // Already formatted upstream; do not format twice.
        self.inner.write_preformatted(record, formatted)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    fn is_healthy(&self) -> bool {
        self.inner.is_healthy()
    }

    fn name(&self) -> String {
        format!("formatted({})_{}", self.formatter.name(), self.inner.name())
    }

    fn capability(&self) -> WriterCapability {
        WriterCapability::Decorator
    }

    fn info(&self) -> SinkInfo {
        self.inner.info()
    }

    fn start(&mut self) -> Result<()> {
        self.inner.start()
    }

    fn stop(&mut self, deadline: Option<Instant>) -> Result<usize> {
        self.inner.stop(deadline)
    }

    fn pending(&self) -> usize {
        self.inner.pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::JsonFormatter;
    use crate::level::LogLevel;
    use crate::writer::testing::CapturingWriter;

    #[test]
    fn test_formats_for_terminal_inner() {
        let capture = CapturingWriter::new();
        let mut writer =
            FormattedWriter::new(Box::new(JsonFormatter::new()), Box::new(capture.clone()));
        let record = LogRecord::builder(LogLevel::Info, "hello").build();
        writer.write(&record).unwrap();

        let lines = capture.captured();
        assert_eq!(lines.len(), 1);
        let parsed: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(parsed["message"], "hello");
    }

    #[test]
    fn test_preformatted_passes_through_unchanged() {
        let capture = CapturingWriter::new();
        let mut writer =
            FormattedWriter::new(Box::new(JsonFormatter::new()), Box::new(capture.clone()));
        let record = LogRecord::builder(LogLevel::Info, "raw").build();
        writer.write_preformatted(&record, "already done").unwrap();
        assert_eq!(capture.captured(), vec!["already done"]);
    }

    #[test]
    fn test_name_composition() {
        let writer = FormattedWriter::new(
            Box::new(JsonFormatter::new()),
            Box::new(CapturingWriter::new()),
        );
        assert_eq!(writer.name(), "formatted(json)_capture");
    }
}
