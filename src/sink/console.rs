use std::io::Write;

use parking_lot::Mutex;

use super::{Sink, SinkInfo};
use crate::error::Result;

/// Output stream for the console sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleTarget {
    Stdout,
    Stderr,
}

/// Console sink with serialized writes. Always reports healthy.
pub struct ConsoleSink {
    target: ConsoleTarget,
    auto_flush: bool,
    // Serializes writes from this sink; the process-wide stream lock is
    // taken per call underneath.
    guard: Mutex<()>,
}

impl ConsoleSink {
    pub fn new(target: ConsoleTarget) -> Self {
        ConsoleSink {
            target,
            auto_flush: false,
            guard: Mutex::new(()),
        }
    }

    pub fn stdout() -> Self {
        ConsoleSink::new(ConsoleTarget::Stdout)
    }

    pub fn stderr() -> Self {
        ConsoleSink::new(ConsoleTarget::Stderr)
    }

    /// Flush the stream after every record.
    pub fn with_auto_flush(mut self, auto_flush: bool) -> Self {
        self.auto_flush = auto_flush;
        self
    }
}

impl Sink for ConsoleSink {
    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        let _serialized = self.guard.lock();
        match self.target {
            ConsoleTarget::Stdout => {
                let stdout = std::io::stdout();
                let mut handle = stdout.lock();
                handle.write_all(bytes)?;
                if self.auto_flush {
                    handle.flush()?;
                }
            }
            ConsoleTarget::Stderr => {
                let stderr = std::io::stderr();
                let mut handle = stderr.lock();
                handle.write_all(bytes)?;
                if self.auto_flush {
                    handle.flush()?;
                }
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        match self.target {
            ConsoleTarget::Stdout => std::io::stdout().flush()?,
            ConsoleTarget::Stderr => std::io::stderr().flush()?,
        }
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn name(&self) -> String {
        match self.target {
            ConsoleTarget::Stdout => "console".to_string(),
            ConsoleTarget::Stderr => "console_err".to_string(),
        }
    }

    fn info(&self) -> SinkInfo {
        SinkInfo {
            name: self.name(),
            kind: "console",
            healthy: true,
            detail: format!("target={:?} auto_flush={}", self.target, self.auto_flush),
        }
    }
}
