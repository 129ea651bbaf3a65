//! Common types shared by the rolling sink and its compression worker
//!
//! Errors raised while building a sink, and the counters both halves of the
//! pipeline update.

use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Metrics shared by a sink and its compression worker
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Successful write calls
    pub writes: AtomicU64,

    /// Bytes appended to the active file
    pub bytes_written: AtomicU64,

    /// Failed opens or writes of the active file
    pub write_errors: AtomicU64,

    /// Rotations handed to the compression queue
    pub rotations: AtomicU64,

    /// Rotations abandoned because the rename failed
    pub rotation_failures: AtomicU64,

    /// Rotated files compressed into a generation slot
    pub compressions: AtomicU64,

    /// Rotated files dropped after all compression attempts failed
    pub compression_failures: AtomicU64,

    /// Bytes written to compressed generation files
    pub compressed_bytes: AtomicU64,
}

impl SinkMetrics {
    /// Create new metrics instance
    pub const fn new() -> Self {
        Self {
            writes: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            rotations: AtomicU64::new(0),
            rotation_failures: AtomicU64::new(0),
            compressions: AtomicU64::new(0),
            compression_failures: AtomicU64::new(0),
            compressed_bytes: AtomicU64::new(0),
        }
    }

    /// Record a successful write
    #[inline]
    pub fn record_write(&self, bytes: u64) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a failed open or write
    #[inline]
    pub fn record_write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rotation that reached the queue
    #[inline]
    pub fn record_rotation(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rotation whose rename failed
    #[inline]
    pub fn record_rotation_failure(&self) {
        self.rotation_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished compression
    #[inline]
    pub fn record_compression(&self, compressed_bytes: u64) {
        self.compressions.fetch_add(1, Ordering::Relaxed);
        self.compressed_bytes
            .fetch_add(compressed_bytes, Ordering::Relaxed);
    }

    /// Record an abandoned compression
    #[inline]
    pub fn record_compression_failure(&self) {
        self.compression_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            writes: self.writes.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            rotations: self.rotations.load(Ordering::Relaxed),
            rotation_failures: self.rotation_failures.load(Ordering::Relaxed),
            compressions: self.compressions.load(Ordering::Relaxed),
            compression_failures: self.compression_failures.load(Ordering::Relaxed),
            compressed_bytes: self.compressed_bytes.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of sink metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub writes: u64,
    pub bytes_written: u64,
    pub write_errors: u64,
    pub rotations: u64,
    pub rotation_failures: u64,
    pub compressions: u64,
    pub compression_failures: u64,
    pub compressed_bytes: u64,
}

/// Errors raised while constructing a sink
#[derive(Debug, Error)]
pub enum SinkError {
    /// Active file path could not be made absolute
    #[error("invalid path {path}: {source}")]
    InvalidPath {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// No runtime able to host the compression worker
    #[error("runtime error: {0}")]
    Runtime(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SinkError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a runtime error
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }
}

/// Result type for sink construction
pub type Result<T> = std::result::Result<T, SinkError>;

#[cfg(test)]
#[path = "common_test.rs"]
mod common_test;
