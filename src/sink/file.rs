use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::{Sink, SinkInfo};
use crate::error::{LogError, Result};

/// Buffered append-only file sink. Never formats; unhealthy once the
/// underlying stream errors until a successful flush clears it.
pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
    bytes_written: u64,
    errored: bool,
}

impl FileSink {
    /// Open (creating parent directories) in append mode.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| LogError::FileOpen {
                    path: path.display().to_string(),
                    source: e,
                })?;
            }
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| LogError::FileOpen {
                path: path.display().to_string(),
                source: e,
            })?;
        let bytes_written = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(FileSink {
            path,
            writer: BufWriter::new(file),
            bytes_written,
            errored: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl Sink for FileSink {
    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        match self.writer.write_all(bytes) {
            Ok(()) => {
                self.bytes_written += bytes.len() as u64;
                Ok(())
            }
            Err(e) => {
                self.errored = true;
                Err(LogError::FileWrite(e))
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        match self.writer.flush() {
            Ok(()) => {
                self.errored = false;
                Ok(())
            }
            Err(e) => {
                self.errored = true;
                Err(LogError::FileWrite(e))
            }
        }
    }

    fn is_healthy(&self) -> bool {
        !self.errored
    }

    fn name(&self) -> String {
        "file".to_string()
    }

    fn info(&self) -> SinkInfo {
        SinkInfo {
            name: self.name(),
            kind: "file",
            healthy: self.is_healthy(),
            detail: format!(
                "path={} bytes_written={}",
                self.path.display(),
                self.bytes_written
            ),
        }
    }

    fn stop(&mut self) -> Result<()> {
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_and_flush() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.log");
        let mut sink = FileSink::new(&path).unwrap();
        sink.write_raw(b"first line\n").unwrap();
        sink.write_raw(b"second line\n").unwrap();
        sink.flush().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "first line\nsecond line\n");
        assert_eq!(sink.bytes_written(), content.len() as u64);
        assert!(sink.is_healthy());
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/deeper/out.log");
        let mut sink = FileSink::new(&path).unwrap();
        sink.write_raw(b"x").unwrap();
        sink.flush().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_append_preserves_existing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.log");
        std::fs::write(&path, "existing\n").unwrap();
        let mut sink = FileSink::new(&path).unwrap();
        assert_eq!(sink.bytes_written(), 9);
        sink.write_raw(b"appended\n").unwrap();
        sink.flush().unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "existing\nappended\n"
        );
    }
}
