//! # Encrypted File Sink
//!
//! Terminal writer that encrypts each record into a binary frame and
//! appends it to a file it owns. Frames are self-delimiting; the companion
//! [`crate::crypt::LogDecryptor`] reads them back one at a time.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime};

use crate::crypt::{encrypt_frame, generate_iv, EncryptionConfig, EncryptionKey, IV_SIZE};
use crate::error::{LogError, Result};
use crate::record::LogRecord;
use crate::sink::SinkInfo;
use crate::writer::LogWriter;

pub struct EncryptedFileSink {
    path: PathBuf,
    writer: BufWriter<File>,
    config: EncryptionConfig,
    /// Fixed IV used when per-entry rotation is disabled.
    static_iv: [u8; IV_SIZE],
    entries_encrypted: AtomicU64,
    last_key_rotation: SystemTime,
    healthy: bool,
}

impl EncryptedFileSink {
    pub fn new(path: impl AsRef<Path>, config: EncryptionConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();
        if path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(LogError::PathTraversal(path.display().to_string()));
        }
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
        Ok(EncryptedFileSink {
            path,
            writer: BufWriter::new(file),
            config,
            static_iv: generate_iv(),
            entries_encrypted: AtomicU64::new(0),
            last_key_rotation: SystemTime::now(),
            healthy: true,
        })
    }

    pub fn entries_encrypted(&self) -> u64 {
        self.entries_encrypted.load(Ordering::Relaxed)
    }

    pub fn last_key_rotation(&self) -> SystemTime {
        self.last_key_rotation
    }

    /// True once the configured rotation interval has elapsed.
    pub fn rotation_due(&self) -> bool {
        match self.config.key_rotation_interval {
            Some(interval) => self
                .last_key_rotation
                .elapsed()
                .map(|elapsed| elapsed >= interval)
                .unwrap_or(false),
            None => false,
        }
    }

    /// Swap the encryption key. Pending frames are flushed under the old
    /// key first; the retired key is zeroized when it drops.
    pub fn rotate_key(&mut self, new_key: EncryptionKey) -> Result<()> {
        self.flush()?;
        self.config.key = new_key;
        self.last_key_rotation = SystemTime::now();
        Ok(())
    }

    fn write_plaintext(&mut self, plaintext: &[u8]) -> Result<()> {
        if !self.healthy {
            return Err(LogError::WriterUnhealthy(self.name()));
        }
        let iv = if self.config.rotate_iv_per_entry {
            generate_iv()
        } else {
            self.static_iv
        };
        let frame = match encrypt_frame(self.config.algorithm, &self.config.key, iv, plaintext) {
            Ok(frame) => frame,
            Err(e) => {
                self.healthy = false;
                return Err(e);
            }
        };
        self.writer.write_all(&frame.encode()).map_err(|e| {
            self.healthy = false;
            LogError::FileWrite(e)
        })?;
        self.entries_encrypted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl LogWriter for EncryptedFileSink {
    fn write(&mut self, record: &LogRecord) -> Result<()> {
        self.write_plaintext(record.message().as_bytes())
    }

    fn write_preformatted(&mut self, _record: &LogRecord, formatted: &str) -> Result<()> {
        self.write_plaintext(formatted.as_bytes())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush().map_err(|e| {
            self.healthy = false;
            LogError::FileWrite(e)
        })
    }

    fn is_healthy(&self) -> bool {
        self.healthy
    }

    fn name(&self) -> String {
        "encrypted_file".to_string()
    }

    fn info(&self) -> SinkInfo {
        SinkInfo {
            name: self.name(),
            kind: "encrypted_file",
            healthy: self.healthy,
            detail: format!(
                "path={} algorithm={} entries={}",
                self.path.display(),
                self.config.algorithm.as_str(),
                self.entries_encrypted()
            ),
        }
    }

    fn stop(&mut self, _deadline: Option<Instant>) -> Result<usize> {
        self.flush()?;
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypt::{EncryptionAlgorithm, LogDecryptor};
    use crate::level::LogLevel;
    use tempfile::tempdir;

    fn config() -> (EncryptionConfig, EncryptionKey) {
        let key = EncryptionKey::generate();
        (
            EncryptionConfig::new(EncryptionAlgorithm::Aes256Gcm, key.clone()),
            key,
        )
    }

    #[test]
    fn test_write_then_decrypt_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("secure.log.enc");
        let (config, key) = config();
        let mut sink = EncryptedFileSink::new(&path, config).unwrap();

        let record = LogRecord::builder(LogLevel::Error, "秘密").build();
        sink.write(&record).unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.entries_encrypted(), 1);

        let decryptor = LogDecryptor::new(key);
        let mut entries = Vec::new();
        let count = decryptor
            .decrypt_file_streaming(&path, |entry| entries.push(entry.to_string()))
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(entries, vec!["秘密"]);
    }

    #[test]
    fn test_multiple_frames_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("secure.log.enc");
        let (config, key) = config();
        let mut sink = EncryptedFileSink::new(&path, config).unwrap();
        for i in 0..5 {
            let record = LogRecord::builder(LogLevel::Info, &format!("entry {}", i)).build();
            sink.write(&record).unwrap();
        }
        sink.flush().unwrap();

        let decryptor = LogDecryptor::new(key);
        let mut entries = Vec::new();
        decryptor
            .decrypt_file_streaming(&path, |entry| entries.push(entry.to_string()))
            .unwrap();
        assert_eq!(
            entries,
            (0..5).map(|i| format!("entry {}", i)).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_tampered_file_fails_decryption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("secure.log.enc");
        let (config, key) = config();
        let mut sink = EncryptedFileSink::new(&path, config).unwrap();
        let record = LogRecord::builder(LogLevel::Error, "integrity matters").build();
        sink.write(&record).unwrap();
        sink.flush().unwrap();

        // Flip one byte in the tag region of the single frame.
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[16 + IV_SIZE] ^= 0x01;
        std::fs::write(&path, &bytes).unwrap();

        let decryptor = LogDecryptor::new(key);
        assert!(decryptor.decrypt_file_streaming(&path, |_| {}).is_err());
    }

    #[test]
    fn test_parent_dir_components_rejected() {
        let (config, _key) = config();
        let outcome = EncryptedFileSink::new("logs/../../etc/secure.enc", config);
        assert!(matches!(
            outcome,
            Err(crate::error::LogError::PathTraversal(_))
        ));
    }

    #[test]
    fn test_key_rotation_stamps_time() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("secure.log.enc");
        let (config, _key) = config();
        let mut sink = EncryptedFileSink::new(&path, config).unwrap();
        let before = sink.last_key_rotation();
        std::thread::sleep(std::time::Duration::from_millis(10));
        sink.rotate_key(EncryptionKey::generate()).unwrap();
        assert!(sink.last_key_rotation() > before);
        // Writes continue under the new key.
        let record = LogRecord::builder(LogLevel::Info, "after rotation").build();
        sink.write(&record).unwrap();
    }

    #[test]
    fn test_decrypt_file_to_output() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("secure.log.enc");
        let out = dir.path().join("plain.log");
        let (config, key) = config();
        let mut sink = EncryptedFileSink::new(&path, config).unwrap();
        for message in ["alpha", "beta"] {
            let record = LogRecord::builder(LogLevel::Info, message).build();
            sink.write(&record).unwrap();
        }
        sink.flush().unwrap();

        let decryptor = LogDecryptor::new(key);
        assert_eq!(decryptor.decrypt_file(&path, &out).unwrap(), 2);
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "alpha\nbeta\n");
    }
}
