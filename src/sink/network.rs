//! # Network Sink
//!
//! Unicast TCP/UDP shipper. The producer-facing write appends to a bounded
//! channel (drop-oldest, counted) and returns; a sender worker drains the
//! channel onto the socket and a reconnect worker re-establishes the
//! connection after failures. Records travel as one JSON object per line,
//! UTF-8, `\n`-terminated.

use std::io::Write;
use std::net::{TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::SecondsFormat;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};
use serde_json::{Map, Value};

use super::SinkInfo;
use crate::error::{LogError, Result};
use crate::record::LogRecord;
use crate::worker::StopToken;
use crate::writer::{LogWriter, WriterCapability};

static HOSTNAME: Lazy<String> = Lazy::new(|| {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "localhost".to_string())
});

/// Transport used by the network sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkProtocol {
    Tcp,
    Udp,
}

/// Endpoint and tuning for a [`NetworkSink`].
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub protocol: NetworkProtocol,
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub reconnect_interval: Duration,
    pub queue_capacity: usize,
}

impl NetworkConfig {
    pub fn tcp(host: &str, port: u16) -> Self {
        NetworkConfig {
            protocol: NetworkProtocol::Tcp,
            host: host.to_string(),
            port,
            connect_timeout: Duration::from_secs(5),
            reconnect_interval: Duration::from_secs(5),
            queue_capacity: 8192,
        }
    }

    pub fn udp(host: &str, port: u16) -> Self {
        NetworkConfig {
            protocol: NetworkProtocol::Udp,
            ..NetworkConfig::tcp(host, port)
        }
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

enum Connection {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

struct NetShared {
    conn: Mutex<Option<Connection>>,
    connected: AtomicBool,
    reconnect_gate: Mutex<()>,
    reconnect_cond: Condvar,
    /// Lines pulled off the channel but not yet committed to the socket.
    in_flight: AtomicUsize,
    dropped: AtomicU64,
    sent: AtomicU64,
    send_errors: AtomicU64,
}

/// Record-oriented terminal writer shipping JSON lines to one endpoint.
pub struct NetworkSink {
    config: NetworkConfig,
    shared: Arc<NetShared>,
    tx: Sender<String>,
    rx: Receiver<String>,
    token: StopToken,
    sender: Option<JoinHandle<()>>,
    reconnector: Option<JoinHandle<()>>,
}

impl NetworkSink {
    pub fn new(config: NetworkConfig) -> Self {
        let (tx, rx) = bounded(config.queue_capacity.max(1));
        NetworkSink {
            shared: Arc::new(NetShared {
                conn: Mutex::new(None),
                connected: AtomicBool::new(false),
                reconnect_gate: Mutex::new(()),
                reconnect_cond: Condvar::new(),
                in_flight: AtomicUsize::new(0),
                dropped: AtomicU64::new(0),
                sent: AtomicU64::new(0),
                send_errors: AtomicU64::new(0),
            }),
            config,
            tx,
            rx,
            token: StopToken::new(),
            sender: None,
            reconnector: None,
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    pub fn sent_count(&self) -> u64 {
        self.shared.sent.load(Ordering::Relaxed)
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Relaxed)
    }

    /// Serialize a record to its wire line (without the trailing newline).
    pub fn encode_wire(record: &LogRecord) -> String {
        let mut object = Map::with_capacity(8);
        object.insert(
            "@timestamp".to_string(),
            Value::String(
                record
                    .timestamp_utc()
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
            ),
        );
        object.insert(
            "level".to_string(),
            Value::String(record.level().as_str().to_string()),
        );
        object.insert(
            "message".to_string(),
            Value::String(record.message().to_string()),
        );
        if let Some(location) = record.location() {
            object.insert(
                "file".to_string(),
                Value::String(location.file.as_str().to_string()),
            );
            object.insert("line".to_string(), Value::from(location.line));
            if !location.function.is_empty() {
                object.insert(
                    "function".to_string(),
                    Value::String(location.function.as_str().to_string()),
                );
            }
        }
        object.insert("host".to_string(), Value::String(HOSTNAME.clone()));
        serde_json::to_string(&Value::Object(object)).unwrap_or_default()
    }

    /// Bounded enqueue: on a full channel the oldest line is discarded and
    /// counted, then the new line is admitted.
    fn enqueue_line(&self, line: String) {
        if let Err(TrySendError::Full(line)) = self.tx.try_send(line) {
            if self.rx.try_recv().is_ok() {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            }
            if self.tx.try_send(line).is_err() {
                self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn connect(config: &NetworkConfig) -> Result<Connection> {
        match config.protocol {
            NetworkProtocol::Tcp => {
                use std::net::ToSocketAddrs;
                let addrs: Vec<std::net::SocketAddr> = config
                    .endpoint()
                    .to_socket_addrs()
                    .map_err(|e| LogError::NetworkConnection(format!("resolve failed: {}", e)))?
                    .collect();
                let addr = addrs.first().ok_or_else(|| {
                    LogError::NetworkConnection(format!("no address for {}", config.endpoint()))
                })?;
                let stream = TcpStream::connect_timeout(addr, config.connect_timeout)
                    .map_err(|e| LogError::NetworkConnection(e.to_string()))?;
                let _ = stream.set_write_timeout(Some(config.connect_timeout));
                let _ = stream.set_nodelay(true);
                Ok(Connection::Tcp(stream))
            }
            NetworkProtocol::Udp => {
                let socket = UdpSocket::bind("0.0.0.0:0")
                    .map_err(|e| LogError::NetworkConnection(e.to_string()))?;
                socket
                    .connect(config.endpoint())
                    .map_err(|e| LogError::NetworkConnection(e.to_string()))?;
                Ok(Connection::Udp(socket))
            }
        }
    }

    fn spawn_workers(&mut self) {
        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();
        let token = self.token.clone();
        self.reconnector = std::thread::Builder::new()
            .name("logpipe-net-reconnect".to_string())
            .spawn(move || {
                while !token.is_stopped() {
                    if !shared.connected.load(Ordering::Relaxed) {
                        if let Ok(conn) = NetworkSink::connect(&config) {
                            *shared.conn.lock() = Some(conn);
                            shared.connected.store(true, Ordering::Relaxed);
                        }
                    }
                    let mut gate = shared.reconnect_gate.lock();
                    let _ = shared
                        .reconnect_cond
                        .wait_for(&mut gate, config.reconnect_interval);
                }
            })
            .ok();

        let shared = Arc::clone(&self.shared);
        let token = self.token.clone();
        let rx = self.rx.clone();
        self.sender = std::thread::Builder::new()
            .name("logpipe-net-sender".to_string())
            .spawn(move || {
                // A line that failed to send is carried to the next attempt
                // so delivery order is preserved across reconnects.
                let mut carry: Option<String> = None;
                loop {
                    let line = match carry.take() {
                        Some(line) => line,
                        None => match rx.recv_timeout(Duration::from_millis(200)) {
                            Ok(line) => {
                                shared.in_flight.fetch_add(1, Ordering::AcqRel);
                                line
                            }
                            Err(RecvTimeoutError::Timeout) => {
                                if token.is_stopped() {
                                    break;
                                }
                                continue;
                            }
                            Err(RecvTimeoutError::Disconnected) => break,
                        },
                    };

                    let mut conn = shared.conn.lock();
                    let sent = match conn.as_mut() {
                        Some(Connection::Tcp(stream)) => {
                            let mut payload = line.clone().into_bytes();
                            payload.push(b'\n');
                            stream.write_all(&payload).is_ok()
                        }
                        Some(Connection::Udp(socket)) => {
                            let mut payload = line.clone().into_bytes();
                            payload.push(b'\n');
                            socket.send(&payload).is_ok()
                        }
                        None => false,
                    };

                    if sent {
                        shared.sent.fetch_add(1, Ordering::Relaxed);
                        shared.in_flight.fetch_sub(1, Ordering::AcqRel);
                    } else {
                        shared.send_errors.fetch_add(1, Ordering::Relaxed);
                        *conn = None;
                        shared.connected.store(false, Ordering::Relaxed);
                        drop(conn);
                        shared.reconnect_cond.notify_all();
                        if token.is_stopped() {
                            shared.dropped.fetch_add(1, Ordering::Relaxed);
                            shared.in_flight.fetch_sub(1, Ordering::AcqRel);
                            break;
                        }
                        carry = Some(line);
                        // Brief backoff so a dead endpoint does not spin.
                        std::thread::sleep(Duration::from_millis(50));
                    }
                }
            })
            .ok();
    }
}

impl LogWriter for NetworkSink {
    fn write(&mut self, record: &LogRecord) -> Result<()> {
        self.enqueue_line(Self::encode_wire(record));
        Ok(())
    }

    fn write_preformatted(&mut self, _record: &LogRecord, formatted: &str) -> Result<()> {
        self.enqueue_line(formatted.to_string());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.config.connect_timeout;
        loop {
            if self.rx.is_empty() && self.shared.in_flight.load(Ordering::Acquire) == 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(LogError::FlushTimeout(self.config.connect_timeout));
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    fn is_healthy(&self) -> bool {
        self.shared.connected.load(Ordering::Relaxed)
    }

    fn name(&self) -> String {
        "network".to_string()
    }

    fn capability(&self) -> WriterCapability {
        WriterCapability::Async
    }

    fn info(&self) -> SinkInfo {
        SinkInfo {
            name: self.name(),
            kind: "network",
            healthy: self.is_healthy(),
            detail: format!(
                "endpoint={} protocol={:?} sent={} dropped={} queued={}",
                self.config.endpoint(),
                self.config.protocol,
                self.sent_count(),
                self.dropped_count(),
                self.rx.len()
            ),
        }
    }

    fn start(&mut self) -> Result<()> {
        if self.sender.is_none() {
            self.spawn_workers();
        }
        Ok(())
    }

    fn stop(&mut self, deadline: Option<Instant>) -> Result<usize> {
        self.token.request_stop(deadline);
        self.shared.reconnect_cond.notify_all();
        if let Some(handle) = self.sender.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.reconnector.take() {
            let _ = handle.join();
        }
        let mut remaining = 0usize;
        while self.rx.try_recv().is_ok() {
            remaining += 1;
        }
        self.shared
            .dropped
            .fetch_add(remaining as u64, Ordering::Relaxed);
        *self.shared.conn.lock() = None;
        self.shared.connected.store(false, Ordering::Relaxed);
        Ok(remaining)
    }

    fn pending(&self) -> usize {
        self.rx.len() + self.shared.in_flight.load(Ordering::Acquire)
    }
}

impl Drop for NetworkSink {
    fn drop(&mut self) {
        let _ = LogWriter::stop(self, Some(Instant::now() + Duration::from_secs(1)));
    }
}
