//! # Encrypted Frame Codec
//!
//! Binary frame format shared by the encrypted writer and the companion
//! decryptor. Each record becomes one self-delimiting frame:
//!
//! `magic(4) version(1) algorithm(1) reserved(2) original_len(4)
//! encrypted_len(4) iv(16) tag(16) ciphertext(encrypted_len)`
//!
//! All integers little-endian. AEAD algorithms consume the first 12 IV bytes
//! as the nonce; AES-256-CBC uses the full 16 bytes and authenticates with
//! HMAC-SHA-256 over `iv || ciphertext`, truncated to 16 bytes.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::time::Duration;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use chacha20poly1305::ChaCha20Poly1305;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::{LogError, Result};

/// Frame magic: "ENCR".
pub const FRAME_MAGIC: u32 = 0x454E_4352;
/// Current frame format version.
pub const FRAME_VERSION: u8 = 1;
/// IV length stored in every frame.
pub const IV_SIZE: usize = 16;
/// Tag length stored in every frame.
pub const TAG_SIZE: usize = 16;
/// Fixed header length preceding the ciphertext.
pub const HEADER_SIZE: usize = 4 + 1 + 1 + 2 + 4 + 4 + IV_SIZE + TAG_SIZE;

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Supported encryption algorithms. The discriminant is the wire byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EncryptionAlgorithm {
    /// AES-256 in GCM mode. Recommended: authenticated encryption.
    Aes256Gcm = 0,
    /// AES-256 in CBC mode with HMAC-SHA-256. Legacy support.
    Aes256Cbc = 1,
    /// ChaCha20-Poly1305. Modern AEAD alternative.
    ChaCha20Poly1305 = 2,
}

impl EncryptionAlgorithm {
    pub fn from_wire(byte: u8) -> Option<EncryptionAlgorithm> {
        match byte {
            0 => Some(EncryptionAlgorithm::Aes256Gcm),
            1 => Some(EncryptionAlgorithm::Aes256Cbc),
            2 => Some(EncryptionAlgorithm::ChaCha20Poly1305),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EncryptionAlgorithm::Aes256Gcm => "aes-256-gcm",
            EncryptionAlgorithm::Aes256Cbc => "aes-256-cbc",
            EncryptionAlgorithm::ChaCha20Poly1305 => "chacha20-poly1305",
        }
    }
}

/// 256-bit key whose memory is zeroized on drop and on rotation.
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Wrap existing key material. Must be exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(LogError::InvalidKeySize {
                expected: KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(EncryptionKey { bytes: key })
    }

    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::rng().fill_bytes(&mut key);
        EncryptionKey { bytes: key }
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Clone for EncryptionKey {
    fn clone(&self) -> Self {
        EncryptionKey { bytes: self.bytes }
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl fmt::Debug for EncryptionKey {
    // Key material never appears in diagnostics.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Settings for an encrypted sink.
#[derive(Debug, Clone)]
pub struct EncryptionConfig {
    pub algorithm: EncryptionAlgorithm,
    pub key: EncryptionKey,
    /// Generate a fresh IV for every entry. Strongly recommended.
    pub rotate_iv_per_entry: bool,
    /// Automatic key rotation interval, when set.
    pub key_rotation_interval: Option<Duration>,
}

impl EncryptionConfig {
    pub fn new(algorithm: EncryptionAlgorithm, key: EncryptionKey) -> Self {
        EncryptionConfig {
            algorithm,
            key,
            rotate_iv_per_entry: true,
            key_rotation_interval: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(interval) = self.key_rotation_interval {
            if interval.is_zero() {
                return Err(LogError::InvalidConfiguration(
                    "key_rotation_interval must be non-zero when set".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Parsed frame header plus ciphertext.
#[derive(Debug, Clone)]
pub struct EncryptedFrame {
    pub algorithm: EncryptionAlgorithm,
    pub original_length: u32,
    pub iv: [u8; IV_SIZE],
    pub tag: [u8; TAG_SIZE],
    pub ciphertext: Vec<u8>,
}

impl EncryptedFrame {
    /// Serialize the frame into its wire representation.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE + self.ciphertext.len());
        out.extend_from_slice(&FRAME_MAGIC.to_le_bytes());
        out.push(FRAME_VERSION);
        out.push(self.algorithm as u8);
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&self.original_length.to_le_bytes());
        out.extend_from_slice(&(self.ciphertext.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.tag);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Read one frame from a stream. Returns `Ok(None)` at clean EOF.
    pub fn read_from(reader: &mut impl Read) -> Result<Option<EncryptedFrame>> {
        let mut header = [0u8; HEADER_SIZE];
        match reader.read_exact(&mut header[..1]) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(LogError::Decryption(format!("frame read: {}", e))),
        }
        reader
            .read_exact(&mut header[1..])
            .map_err(|e| LogError::Decryption(format!("truncated frame header: {}", e)))?;

        let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        if magic != FRAME_MAGIC {
            return Err(LogError::Decryption(format!(
                "bad frame magic: {:#010x}",
                magic
            )));
        }
        let version = header[4];
        if version != FRAME_VERSION {
            return Err(LogError::Decryption(format!(
                "unsupported frame version: {}",
                version
            )));
        }
        let algorithm = EncryptionAlgorithm::from_wire(header[5]).ok_or_else(|| {
            LogError::Decryption(format!("unknown algorithm byte: {}", header[5]))
        })?;
        let original_length = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        let encrypted_length = u32::from_le_bytes([header[12], header[13], header[14], header[15]]);

        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(&header[16..16 + IV_SIZE]);
        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(&header[16 + IV_SIZE..HEADER_SIZE]);

        let mut ciphertext = vec![0u8; encrypted_length as usize];
        reader
            .read_exact(&mut ciphertext)
            .map_err(|e| LogError::Decryption(format!("truncated ciphertext: {}", e)))?;

        Ok(Some(EncryptedFrame {
            algorithm,
            original_length,
            iv,
            tag,
            ciphertext,
        }))
    }
}

/// Generate a random 16-byte IV.
pub fn generate_iv() -> [u8; IV_SIZE] {
    let mut iv = [0u8; IV_SIZE];
    rand::rng().fill_bytes(&mut iv);
    iv
}

/// Encrypt one plaintext record into a frame.
pub fn encrypt_frame(
    algorithm: EncryptionAlgorithm,
    key: &EncryptionKey,
    iv: [u8; IV_SIZE],
    plaintext: &[u8],
) -> Result<EncryptedFrame> {
    let (ciphertext, tag) = match algorithm {
        EncryptionAlgorithm::Aes256Gcm => {
            let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
                .map_err(|e| LogError::Encryption(e.to_string()))?;
            let nonce = Nonce::from_slice(&iv[..NONCE_SIZE]);
            let sealed = cipher
                .encrypt(nonce, plaintext)
                .map_err(|e| LogError::Encryption(e.to_string()))?;
            split_aead_output(sealed)?
        }
        EncryptionAlgorithm::ChaCha20Poly1305 => {
            let cipher = ChaCha20Poly1305::new_from_slice(key.as_bytes())
                .map_err(|e| LogError::Encryption(e.to_string()))?;
            let nonce = chacha20poly1305::Nonce::from_slice(&iv[..NONCE_SIZE]);
            let sealed = cipher
                .encrypt(nonce, plaintext)
                .map_err(|e| LogError::Encryption(e.to_string()))?;
            split_aead_output(sealed)?
        }
        EncryptionAlgorithm::Aes256Cbc => {
            use aes::cipher::{block_padding::Pkcs7, BlockEncryptMut, KeyIvInit};
            let ciphertext = Aes256CbcEnc::new(key.as_bytes().into(), (&iv).into())
                .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
            let tag = cbc_tag(key, &iv, &ciphertext)?;
            (ciphertext, tag)
        }
    };

    Ok(EncryptedFrame {
        algorithm,
        original_length: plaintext.len() as u32,
        iv,
        tag,
        ciphertext,
    })
}

/// Decrypt one frame. Fails if any byte of ciphertext, IV or tag was altered.
pub fn decrypt_frame(frame: &EncryptedFrame, key: &EncryptionKey) -> Result<Vec<u8>> {
    let plaintext = match frame.algorithm {
        EncryptionAlgorithm::Aes256Gcm => {
            let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
                .map_err(|e| LogError::Decryption(e.to_string()))?;
            let nonce = Nonce::from_slice(&frame.iv[..NONCE_SIZE]);
            let mut sealed = frame.ciphertext.clone();
            sealed.extend_from_slice(&frame.tag);
            cipher
                .decrypt(nonce, sealed.as_slice())
                .map_err(|_| LogError::Decryption("authentication failed".into()))?
        }
        EncryptionAlgorithm::ChaCha20Poly1305 => {
            let cipher = ChaCha20Poly1305::new_from_slice(key.as_bytes())
                .map_err(|e| LogError::Decryption(e.to_string()))?;
            let nonce = chacha20poly1305::Nonce::from_slice(&frame.iv[..NONCE_SIZE]);
            let mut sealed = frame.ciphertext.clone();
            sealed.extend_from_slice(&frame.tag);
            cipher
                .decrypt(nonce, sealed.as_slice())
                .map_err(|_| LogError::Decryption("authentication failed".into()))?
        }
        EncryptionAlgorithm::Aes256Cbc => {
            use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, KeyIvInit};
            let mut mac = <HmacSha256 as Mac>::new_from_slice(key.as_bytes())
                .map_err(|e| LogError::Decryption(e.to_string()))?;
            mac.update(&frame.iv);
            mac.update(&frame.ciphertext);
            mac.verify_truncated_left(&frame.tag)
                .map_err(|_| LogError::Decryption("authentication failed".into()))?;
            Aes256CbcDec::new(key.as_bytes().into(), (&frame.iv).into())
                .decrypt_padded_vec_mut::<Pkcs7>(&frame.ciphertext)
                .map_err(|_| LogError::Decryption("bad padding".into()))?
        }
    };

    if plaintext.len() != frame.original_length as usize {
        return Err(LogError::Decryption(format!(
            "length mismatch: header says {}, got {}",
            frame.original_length,
            plaintext.len()
        )));
    }
    Ok(plaintext)
}

fn split_aead_output(mut sealed: Vec<u8>) -> Result<(Vec<u8>, [u8; TAG_SIZE])> {
    if sealed.len() < TAG_SIZE {
        return Err(LogError::Encryption("ciphertext shorter than tag".into()));
    }
    let split = sealed.len() - TAG_SIZE;
    let tag_bytes = sealed.split_off(split);
    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(&tag_bytes);
    Ok((sealed, tag))
}

fn cbc_tag(key: &EncryptionKey, iv: &[u8; IV_SIZE], ciphertext: &[u8]) -> Result<[u8; TAG_SIZE]> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key.as_bytes())
        .map_err(|e| LogError::Encryption(e.to_string()))?;
    mac.update(iv);
    mac.update(ciphertext);
    let digest = mac.finalize().into_bytes();
    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(&digest[..TAG_SIZE]);
    Ok(tag)
}

/// Companion utility that reads encrypted log files frame-by-frame.
pub struct LogDecryptor {
    key: EncryptionKey,
}

impl LogDecryptor {
    pub fn new(key: EncryptionKey) -> Self {
        LogDecryptor { key }
    }

    /// Decrypt a single raw frame buffer.
    pub fn decrypt_entry(&self, encrypted: &[u8]) -> Result<String> {
        let mut cursor = encrypted;
        let frame = EncryptedFrame::read_from(&mut cursor)?
            .ok_or_else(|| LogError::Decryption("empty input".into()))?;
        let plaintext = decrypt_frame(&frame, &self.key)?;
        String::from_utf8(plaintext).map_err(|e| LogError::Decryption(e.to_string()))
    }

    /// Decrypt an entire file, writing one plaintext line per frame.
    /// Returns the number of frames decrypted.
    pub fn decrypt_file(&self, input: &Path, output: &Path) -> Result<usize> {
        let mut writer = BufWriter::new(File::create(output).map_err(|e| LogError::FileOpen {
            path: output.display().to_string(),
            source: e,
        })?);
        let count = self.decrypt_file_streaming(input, |entry| {
            let _ = writeln!(writer, "{}", entry);
        })?;
        writer.flush()?;
        Ok(count)
    }

    /// Decrypt a file, invoking `callback` with each plaintext entry.
    pub fn decrypt_file_streaming(
        &self,
        input: &Path,
        mut callback: impl FnMut(&str),
    ) -> Result<usize> {
        let file = File::open(input).map_err(|e| LogError::FileOpen {
            path: input.display().to_string(),
            source: e,
        })?;
        let mut reader = BufReader::new(file);
        let mut count = 0usize;
        while let Some(frame) = EncryptedFrame::read_from(&mut reader)? {
            let plaintext = decrypt_frame(&frame, &self.key)?;
            let text =
                String::from_utf8(plaintext).map_err(|e| LogError::Decryption(e.to_string()))?;
            callback(&text);
            count += 1;
        }
        Ok(count)
    }
}
