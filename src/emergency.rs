//! # Emergency Flush Path
//!
//! A pre-allocated byte ring holding the most recent rendered records, plus
//! three signal-safe accessors: the emergency file descriptor, the buffer
//! pointer, and its length. The accessors allocate nothing and take no
//! lock; a separately installed crash handler can copy the buffer to the
//! descriptor to maximize data survival.
//!
//! The ring stores atomic bytes so the crash-time reader can race the
//! normal-path writer without undefined behavior; a record torn by such a
//! race is the accepted cost of staying lock-free at the accessor.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use parking_lot::Mutex;

/// Stderr, always writable from a signal handler.
pub const DEFAULT_EMERGENCY_FD: i32 = 2;

pub struct EmergencyRing {
    buf: Box<[AtomicU8]>,
    /// Total bytes ever written; the write offset is `total % capacity`.
    total: AtomicUsize,
    write_guard: Mutex<()>,
    fd: i32,
}

impl EmergencyRing {
    /// Allocate the ring once, up front. `capacity` is in bytes.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1024);
        let mut buf = Vec::with_capacity(capacity);
        buf.resize_with(capacity, || AtomicU8::new(0));
        EmergencyRing {
            buf: buf.into_boxed_slice(),
            total: AtomicUsize::new(0),
            write_guard: Mutex::new(()),
            fd: DEFAULT_EMERGENCY_FD,
        }
    }

    pub fn with_fd(mut self, fd: i32) -> Self {
        self.fd = fd;
        self
    }

    /// Signal-safe: raw descriptor to copy the buffer to.
    pub fn emergency_fd(&self) -> i32 {
        self.fd
    }

    /// Signal-safe: pointer to the pre-allocated ring.
    pub fn buffer_ptr(&self) -> *const u8 {
        self.buf.as_ptr() as *const u8
    }

    /// Signal-safe: ring size in bytes.
    pub fn buffer_len(&self) -> usize {
        self.buf.len()
    }

    /// Append one rendered record. Normal-path only (takes the write lock).
    /// A trailing newline is added when missing.
    pub fn append(&self, line: &[u8]) {
        let _ordered = self.write_guard.lock();
        let capacity = self.buf.len();
        let mut offset = self.total.load(Ordering::Relaxed);
        for &byte in line {
            self.buf[offset % capacity].store(byte, Ordering::Relaxed);
            offset += 1;
        }
        if line.last() != Some(&b'\n') {
            self.buf[offset % capacity].store(b'\n', Ordering::Relaxed);
            offset += 1;
        }
        self.total.store(offset, Ordering::Release);
    }

    /// Ordered copy of the ring contents, oldest first. Diagnostics and
    /// tests; not signal-safe (allocates).
    pub fn snapshot(&self) -> Vec<u8> {
        let _ordered = self.write_guard.lock();
        let capacity = self.buf.len();
        let total = self.total.load(Ordering::Acquire);
        let (start, len) = if total <= capacity {
            (0, total)
        } else {
            (total % capacity, capacity)
        };
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            out.push(self.buf[(start + i) % capacity].load(Ordering::Relaxed));
        }
        out
    }
}
