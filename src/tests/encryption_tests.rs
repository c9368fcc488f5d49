use crate::crypt::{
    EncryptionAlgorithm, EncryptionConfig, EncryptionKey, LogDecryptor, HEADER_SIZE, IV_SIZE,
};
use crate::level::LogLevel;
use crate::logger::Logger;
use crate::writer::PipelineBuilder;

fn fresh_key() -> EncryptionKey {
    EncryptionKey::generate()
}

#[test]
fn test_logger_to_encrypted_file_round_trip() {
    // S3: AES-256-GCM, UTF-8 message, single frame, exact plaintext back.
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("secure.log.enc");
    let key = fresh_key();

    let logger = Logger::builder()
        .min_level(LogLevel::Trace)
        .add_writer(
            "secure",
            PipelineBuilder::encrypted_file(
                &path,
                EncryptionConfig::new(EncryptionAlgorithm::Aes256Gcm, key.clone()),
            )
            .unwrap()
            .build(),
        )
        .build()
        .unwrap();

    logger.error("秘密");
    logger.flush().unwrap();
    logger.stop().unwrap();

    let decryptor = LogDecryptor::new(key);
    let mut entries = Vec::new();
    let count = decryptor
        .decrypt_file_streaming(&path, |entry| entries.push(entry.to_string()))
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(entries, vec!["秘密"]);
}

#[test]
fn test_tag_flip_fails_decryption() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("secure.log.enc");
    let key = fresh_key();

    let logger = Logger::builder()
        .min_level(LogLevel::Trace)
        .add_writer(
            "secure",
            PipelineBuilder::encrypted_file(
                &path,
                EncryptionConfig::new(EncryptionAlgorithm::Aes256Gcm, key.clone()),
            )
            .unwrap()
            .build(),
        )
        .build()
        .unwrap();
    logger.error("tamper target");
    logger.flush().unwrap();
    logger.stop().unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    assert!(bytes.len() > HEADER_SIZE);
    // Tag sits after magic/version/algorithm/reserved/lengths/iv.
    bytes[16 + IV_SIZE] ^= 0x40;
    std::fs::write(&path, &bytes).unwrap();

    let decryptor = LogDecryptor::new(key);
    assert!(decryptor.decrypt_file_streaming(&path, |_| {}).is_err());
}

#[test]
fn test_each_frame_gets_fresh_iv() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("secure.log.enc");
    let key = fresh_key();

    let logger = Logger::builder()
        .min_level(LogLevel::Trace)
        .add_writer(
            "secure",
            PipelineBuilder::encrypted_file(
                &path,
                EncryptionConfig::new(EncryptionAlgorithm::ChaCha20Poly1305, key.clone()),
            )
            .unwrap()
            .build(),
        )
        .build()
        .unwrap();
    logger.info("same plaintext");
    logger.info("same plaintext");
    logger.flush().unwrap();
    logger.stop().unwrap();

    let bytes = std::fs::read(&path).unwrap();
    use crate::crypt::EncryptedFrame;
    let mut cursor = bytes.as_slice();
    let first = EncryptedFrame::read_from(&mut cursor).unwrap().unwrap();
    let second = EncryptedFrame::read_from(&mut cursor).unwrap().unwrap();
    assert_ne!(first.iv, second.iv);
    assert_ne!(first.ciphertext, second.ciphertext);

    let decryptor = LogDecryptor::new(key);
    let mut entries = Vec::new();
    decryptor
        .decrypt_file_streaming(&path, |e| entries.push(e.to_string()))
        .unwrap();
    assert_eq!(entries, vec!["same plaintext", "same plaintext"]);
}

#[test]
fn test_wrong_key_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("secure.log.enc");

    let logger = Logger::builder()
        .min_level(LogLevel::Trace)
        .add_writer(
            "secure",
            PipelineBuilder::encrypted_file(
                &path,
                EncryptionConfig::new(EncryptionAlgorithm::Aes256Gcm, fresh_key()),
            )
            .unwrap()
            .build(),
        )
        .build()
        .unwrap();
    logger.info("sealed");
    logger.flush().unwrap();
    logger.stop().unwrap();

    let decryptor = LogDecryptor::new(fresh_key());
    assert!(decryptor.decrypt_file_streaming(&path, |_| {}).is_err());
}
