//! Rate-limited error logging for the producer side of a sink
//!
//! A full disk turns every `write` into an error. Logging each one would
//! bury the useful line, so the logger emits at most one line per interval
//! and reports how many were swallowed in between.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Default interval between logged errors
pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Rate-limited logger for repeated I/O failures
///
/// Thread-safe: atomic counters plus a mutex around the last log time.
pub struct RateLimitedLogger {
    /// Minimum interval between log lines
    min_interval: Duration,

    /// When the last line was emitted
    last_log_time: Mutex<Option<Instant>>,

    /// Errors since the last emitted line
    suppressed: AtomicU64,

    /// Errors ever recorded
    total: AtomicU64,
}

impl RateLimitedLogger {
    /// Create a logger that emits at most once per `min_interval`
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_log_time: Mutex::new(None),
            suppressed: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    /// Record a failed `operation` on `path`
    ///
    /// Returns true if a line was emitted, false if it was suppressed.
    pub fn error(&self, operation: &str, path: &Path, error: &dyn std::fmt::Display) -> bool {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
        let total = self.total.fetch_add(1, Ordering::Relaxed) + 1;

        if !self.should_log() {
            return false;
        }

        let count = self.suppressed.swap(0, Ordering::Relaxed);
        if count > 1 {
            tracing::error!(
                operation,
                path = %path.display(),
                error = %error,
                suppressed_count = count - 1,
                total_errors = total,
                "sink I/O failed (rate-limited)"
            );
        } else {
            tracing::error!(
                operation,
                path = %path.display(),
                error = %error,
                total_errors = total,
                "sink I/O failed"
            );
        }
        true
    }

    fn should_log(&self) -> bool {
        let mut last = self.last_log_time.lock();
        let now = Instant::now();
        match *last {
            Some(prev) if now.duration_since(prev) < self.min_interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Errors recorded since the last emitted line
    pub fn pending_error_count(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }

    /// Errors ever recorded
    pub fn total_error_count(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

impl Default for RateLimitedLogger {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn disk_full() -> io::Error {
        io::Error::new(io::ErrorKind::StorageFull, "no space left on device")
    }

    #[test]
    fn test_default_interval() {
        let logger = RateLimitedLogger::default();
        assert_eq!(logger.min_interval, DEFAULT_LOG_INTERVAL);
        assert_eq!(logger.total_error_count(), 0);
    }

    #[test]
    fn test_first_error_always_logs() {
        let logger = RateLimitedLogger::new(Duration::from_secs(10));
        assert!(logger.error("write", Path::new("/var/log/app.log"), &disk_full()));
        assert_eq!(logger.total_error_count(), 1);
        assert_eq!(logger.pending_error_count(), 0);
    }

    #[test]
    fn test_rapid_errors_suppressed() {
        let logger = RateLimitedLogger::new(Duration::from_secs(10));
        let path = Path::new("/var/log/app.log");

        assert!(logger.error("write", path, &disk_full()));
        for _ in 0..10 {
            assert!(!logger.error("write", path, &disk_full()));
        }

        assert_eq!(logger.total_error_count(), 11);
        assert_eq!(logger.pending_error_count(), 10);
    }

    #[test]
    fn test_zero_interval_logs_every_error() {
        let logger = RateLimitedLogger::new(Duration::ZERO);
        let path = Path::new("/var/log/app.log");

        assert!(logger.error("open", path, &disk_full()));
        assert!(logger.error("open", path, &disk_full()));
        assert_eq!(logger.pending_error_count(), 0);
    }
}
