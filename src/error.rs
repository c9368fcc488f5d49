//! Error types shared across the crate.
//!
//! Producer-facing `log()` calls never surface these; failures on the hot
//! path become metric counters instead (see `metrics`). Builder, setup,
//! flush and stop operations return them explicitly so callers can escalate.

use thiserror::Error;

/// Error kinds for logger setup and sink operation.
#[derive(Debug, Error)]
pub enum LogError {
    /// Configuration value rejected during validation.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A writer could not be constructed or started.
    #[error("writer initialization failed: {0}")]
    WriterInit(String),

    /// A writer refused an operation because it is not healthy.
    #[error("writer not healthy: {0}")]
    WriterUnhealthy(String),

    /// Failed to open a log file.
    #[error("failed to open log file '{path}': {source}")]
    FileOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write to a log file.
    #[error("file write failed: {0}")]
    FileWrite(#[from] std::io::Error),

    /// Rotation (rename/reopen/prune) failed.
    #[error("file rotation failed: {0}")]
    FileRotation(String),

    /// Log file or key file permissions are too permissive.
    #[error("insecure permissions on '{0}'")]
    InsecurePermissions(String),

    /// A configured path escapes its allowed base directory.
    #[error("path traversal detected: '{0}'")]
    PathTraversal(String),

    /// Could not connect to the remote endpoint.
    #[error("network connection failed: {0}")]
    NetworkConnection(String),

    /// A connected send failed.
    #[error("network send failed: {0}")]
    NetworkSend(String),

    /// A bounded queue was full and the record was dropped.
    #[error("queue full, record dropped")]
    QueueFullDropped,

    /// The block overflow policy timed out waiting for space.
    #[error("queue full, blocked past timeout")]
    QueueFullTimeout,

    /// Flush did not complete within its deadline.
    #[error("flush timed out after {0:?}")]
    FlushTimeout(std::time::Duration),

    /// Encryption of a record failed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Decryption or frame validation failed.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// Key material has the wrong length for the algorithm.
    #[error("invalid key size: expected {expected} bytes, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },

    /// Invalid argument to a builder or setup call.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, LogError>;
