//! # Sinks
//!
//! Terminal writers that commit bytes to an external medium. Byte-oriented
//! sinks (console, file, rotating file) implement [`Sink`] and sit behind a
//! `SinkWriter` adapter; the record-oriented network and encrypted sinks
//! implement the writer contract directly because they own their own
//! serialization (wire JSON, binary frames).

mod console;
mod encrypted;
mod file;
mod network;
mod rotating;

pub use console::{ConsoleSink, ConsoleTarget};
pub use encrypted::EncryptedFileSink;
pub use file::FileSink;
pub use network::{NetworkConfig, NetworkProtocol, NetworkSink};
pub use rotating::{RotatingFileSink, RotationPolicy};

use crate::error::Result;

/// Diagnostics snapshot for a sink.
#[derive(Debug, Clone)]
pub struct SinkInfo {
    pub name: String,
    pub kind: &'static str,
    pub healthy: bool,
    pub detail: String,
}

/// Byte-oriented terminal writer.
///
/// Sinks accept pre-formatted bytes only; formatting happens upstream in
/// the decorator chain.
pub trait Sink: Send {
    /// Commit pre-formatted bytes. Implementations append no separators.
    fn write_raw(&mut self, bytes: &[u8]) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    fn is_healthy(&self) -> bool;

    fn name(&self) -> String;

    fn info(&self) -> SinkInfo {
        SinkInfo {
            name: self.name(),
            kind: "sink",
            healthy: self.is_healthy(),
            detail: String::new(),
        }
    }

    /// Bring up background resources (sockets, workers). Default: no-op.
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Release background resources. Default: no-op.
    fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}
