use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime};

use super::{LogWriter, WriterCapability};
use crate::crypt::{encrypt_frame, generate_iv, EncryptionConfig, EncryptionKey};
use crate::error::{LogError, Result};
use crate::record::LogRecord;
use crate::sink::SinkInfo;

/// Decorator-mode encryption: frames are hex-encoded and forwarded to the
/// inner writer as pre-formatted text.
///
/// This mode exists for diagnostics and ad-hoc wiring; the inner writer
/// receives ciphertext where it expects log text. Production encrypted
/// logging uses [`crate::sink::EncryptedFileSink`], which owns its file and
/// writes raw binary frames.
pub struct EncryptedWriter {
    inner: Box<dyn LogWriter>,
    config: EncryptionConfig,
    entries_encrypted: AtomicU64,
    last_key_rotation: SystemTime,
    healthy: bool,
}

impl EncryptedWriter {
    pub fn new(inner: Box<dyn LogWriter>, config: EncryptionConfig) -> Result<Self> {
        config.validate()?;
        Ok(EncryptedWriter {
            inner,
            config,
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

    /// Flush under the old key, then swap. The retired key zeroizes on drop.
    pub fn rotate_key(&mut self, new_key: EncryptionKey) -> Result<()> {
        self.inner.flush()?;
        self.config.key = new_key;
        self.last_key_rotation = SystemTime::now();
        Ok(())
    }

    fn encrypt_to_hex(&mut self, plaintext: &[u8]) -> Result<String> {
        if !self.healthy {
            return Err(LogError::WriterUnhealthy(self.name()));
        }
        let frame = encrypt_frame(
            self.config.algorithm,
            &self.config.key,
            generate_iv(),
            plaintext,
        )
        .inspect_err(|_| {
            self.healthy = false;
        })?;
        self.entries_encrypted.fetch_add(1, Ordering::Relaxed);
        Ok(hex::encode(frame.encode()))
    }
}

impl LogWriter for EncryptedWriter {
    fn write(&mut self, record: &LogRecord) -> Result<()> {
        let cipher_hex = self.encrypt_to_hex(record.message().as_bytes())?;
        self.inner.write_preformatted(record, &cipher_hex)
    }

    fn write_preformatted(&mut self, record: &LogRecord, formatted: &str) -> Result<()> {
        let cipher_hex = self.encrypt_to_hex(formatted.as_bytes())?;
        self.inner.write_preformatted(record, &cipher_hex)
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    fn is_healthy(&self) -> bool {
        self.healthy && self.inner.is_healthy()
    }

    fn name(&self) -> String {
        format!(
            "encrypted({})_{}",
            self.config.algorithm.as_str(),
            self.inner.name()
        )
    }

    fn capability(&self) -> WriterCapability {
        WriterCapability::Decorator
    }

    fn info(&self) -> SinkInfo {
        SinkInfo {
            name: self.name(),
            kind: "encrypted",
            healthy: self.is_healthy(),
            detail: format!(
                "algorithm={} entries={}",
                self.config.algorithm.as_str(),
                self.entries_encrypted()
            ),
        }
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
    use crate::crypt::{decrypt_frame, EncryptedFrame, EncryptionAlgorithm};
    use crate::level::LogLevel;
    use crate::writer::testing::CapturingWriter;

    #[test]
    fn test_inner_receives_decryptable_hex() {
        let key = EncryptionKey::generate();
        let capture = CapturingWriter::new();
        let mut writer = EncryptedWriter::new(
            Box::new(capture.clone()),
            EncryptionConfig::new(EncryptionAlgorithm::Aes256Gcm, key.clone()),
        )
        .unwrap();

        let record = LogRecord::builder(LogLevel::Info, "hidden message").build();
        writer.write(&record).unwrap();
        assert_eq!(writer.entries_encrypted(), 1);

        let lines = capture.captured();
        assert_eq!(lines.len(), 1);
        let bytes = hex::decode(&lines[0]).unwrap();
        let mut cursor = bytes.as_slice();
        let frame = EncryptedFrame::read_from(&mut cursor).unwrap().unwrap();
        assert_eq!(decrypt_frame(&frame, &key).unwrap(), b"hidden message");
    }

    #[test]
    fn test_name_composition() {
        let writer = EncryptedWriter::new(
            Box::new(CapturingWriter::new()),
            EncryptionConfig::new(EncryptionAlgorithm::ChaCha20Poly1305, EncryptionKey::generate()),
        )
        .unwrap();
        assert_eq!(writer.name(), "encrypted(chacha20-poly1305)_capture");
    }
}
