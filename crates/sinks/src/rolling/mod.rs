//! Rolling File Sink - size-rotated log file with gzip generations
//!
//! Appends bytes to an active file. Once the bytes written since the last
//! rotation reach the threshold, the file is closed, renamed to a temp name
//! and queued for the sink's compression worker, which gzips it into one of
//! a bounded set of generation files.
//!
//! # Directory Structure
//!
//! ```text
//! logs/
//! ├── app.log            # active file
//! ├── app.log.8412937    # rotated, waiting for the worker
//! ├── app.log.1.gz       # generation 1
//! └── app.log.2.gz       # generation 2
//! ```
//!
//! # Features
//!
//! - **Size rotation**: rotates after the write that crosses the threshold,
//!   so a rotated file can overshoot by up to one write
//! - **Bounded generations**: at the limit the least recently replaced
//!   generation is overwritten in place
//! - **Restart safe**: generations are rediscovered from the directory
//! - **Backpressure**: `write` blocks while the compression queue is full
//!
//! # Threading
//!
//! A sink is single-producer: writes take `&mut self`. The compression
//! worker is a tokio task on a multi-threaded runtime. A producer that parks
//! (full queue, `wait_idle`) from a runtime worker thread first hands that
//! thread's scheduler off with `block_in_place`, so the compression task can
//! still run even when it was queued on the producer's own thread.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crossfire::{AsyncRx, MTx};
use tokio::runtime::{Handle, RuntimeFlavor};

use crate::common::{MetricsSnapshot, Result, SinkError, SinkMetrics};
use crate::registry::{FlushTarget, SinkRegistry};
use crate::util::generations::with_suffix;
use crate::util::{
    CompressionRequest, CompressionWorker, DEFAULT_COMPRESS_ATTEMPTS, DEFAULT_COMPRESSION_LEVEL,
    DEFAULT_RETRY_DELAY, GenerationRegistry, PendingWork, RateLimitedLogger, RetryConfig,
};

/// Default number of retained generations
pub const DEFAULT_GENERATIONS: u32 = 5;

/// Default rotation threshold (10MB)
pub const DEFAULT_ROTATION_BYTES: u64 = 10 * 1024 * 1024;

/// Pending rotations allowed per generation before writers block
pub const DEFAULT_QUEUE_FACTOR: usize = 10;

/// Configuration for a rolling file sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollingConfig {
    /// Active file path (made absolute at construction)
    pub path: PathBuf,

    /// Maximum number of retained compressed files
    pub generations: u32,

    /// Bytes written after which the active file rotates
    pub rotation_bytes: u64,

    /// Gzip level, 0..=9
    pub compression_level: u32,

    /// Compression attempts per rotated file before it is dropped
    pub max_compress_attempts: usize,

    /// Delay between compression attempts
    pub retry_delay: Duration,

    /// Queue capacity is `generations * queue_factor`
    pub queue_factor: usize,
}

impl Default for RollingConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("logs/app.log"),
            generations: DEFAULT_GENERATIONS,
            rotation_bytes: DEFAULT_ROTATION_BYTES,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            max_compress_attempts: DEFAULT_COMPRESS_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            queue_factor: DEFAULT_QUEUE_FACTOR,
        }
    }
}

impl RollingConfig {
    /// Create config for the given active file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set the number of retained generations
    #[must_use]
    pub fn with_generations(mut self, generations: u32) -> Self {
        self.generations = generations;
        self
    }

    /// Set the rotation threshold in bytes
    #[must_use]
    pub fn with_rotation_bytes(mut self, rotation_bytes: u64) -> Self {
        self.rotation_bytes = rotation_bytes;
        self
    }

    /// Set the gzip level
    #[must_use]
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    /// Retry failed compressions up to `max_attempts` times in total
    #[must_use]
    pub fn with_retry(mut self, max_attempts: usize, retry_delay: Duration) -> Self {
        self.max_compress_attempts = max_attempts;
        self.retry_delay = retry_delay;
        self
    }

    /// Capacity of the pending-compression queue
    pub fn queue_capacity(&self) -> usize {
        (self.generations as usize).saturating_mul(self.queue_factor)
    }

    /// Check the configuration for values the sink cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.generations == 0 {
            return Err(SinkError::config("generations must be at least 1"));
        }
        if self.rotation_bytes == 0 {
            return Err(SinkError::config("rotation_bytes must be at least 1"));
        }
        if self.compression_level > 9 {
            return Err(SinkError::config(format!(
                "compression_level must be 0..=9, got {}",
                self.compression_level
            )));
        }
        if self.max_compress_attempts == 0 {
            return Err(SinkError::config("max_compress_attempts must be at least 1"));
        }
        if self.queue_factor == 0 {
            return Err(SinkError::config("queue_factor must be at least 1"));
        }
        Ok(())
    }

    fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_compress_attempts,
            retry_delay: self.retry_delay,
        }
    }
}

/// Handle that waits for a sink's compression work to drain
///
/// Stays valid after the sink itself is dropped.
#[derive(Clone)]
pub struct SinkIdleHandle {
    name: String,
    pending: Arc<PendingWork>,
}

impl SinkIdleHandle {
    /// Number of queued plus in-flight compressions
    pub fn outstanding(&self) -> usize {
        self.pending.outstanding()
    }
}

impl FlushTarget for SinkIdleHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn wait_idle(&self) {
        park_producer(|| self.pending.wait_idle());
    }
}

/// Run a blocking producer-side wait without stalling the runtime
///
/// On a multi-threaded runtime worker the call goes through
/// `block_in_place`, which moves this thread's queued tasks (the compression
/// worker included) to another thread first. Elsewhere it runs directly.
fn park_producer<R>(f: impl FnOnce() -> R) -> R {
    match Handle::try_current() {
        Ok(handle) if matches!(handle.runtime_flavor(), RuntimeFlavor::MultiThread) => {
            tokio::task::block_in_place(f)
        }
        _ => f(),
    }
}

/// Size-rotated log file whose rotations are gzipped in the background
pub struct RollingFileSink {
    /// Absolute path of the active file
    path: PathBuf,

    /// Configuration
    config: RollingConfig,

    /// Open handle on the active file, opened lazily
    file: Option<File>,

    /// Bytes written since the last rotation
    bytes_since_rotation: u64,

    /// Producer end of the compression queue
    sender: MTx<CompressionRequest>,

    /// Outstanding compression work shared with the worker
    pending: Arc<PendingWork>,

    /// Metrics shared with the worker
    metrics: Arc<SinkMetrics>,

    /// Throttled logging for open/write failures
    error_logger: RateLimitedLogger,
}

impl RollingFileSink {
    /// Create a sink whose worker runs on the current tokio runtime
    ///
    /// Fails if there is no runtime, if it is a current-thread runtime, if
    /// the configuration is invalid or if the path cannot be made absolute.
    pub fn new(config: RollingConfig, registry: &SinkRegistry) -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| SinkError::runtime(format!("no tokio runtime: {e}")))?;
        Self::with_runtime(config, registry, &handle)
    }

    /// Create a sink whose worker runs on the given runtime
    pub fn with_runtime(
        config: RollingConfig,
        registry: &SinkRegistry,
        handle: &Handle,
    ) -> Result<Self> {
        if matches!(handle.runtime_flavor(), RuntimeFlavor::CurrentThread) {
            return Err(SinkError::runtime(
                "a multi-threaded runtime is required for the compression worker",
            ));
        }

        let (sink, worker, receiver) = Self::build(config)?;
        handle.spawn(worker.run(receiver));
        registry.register(Arc::new(sink.idle_handle()));

        tracing::info!(
            path = %sink.path.display(),
            generations = sink.config.generations,
            rotation_bytes = sink.config.rotation_bytes,
            queue_capacity = sink.config.queue_capacity(),
            "rolling file sink started"
        );

        Ok(sink)
    }

    /// Build the sink and its worker without starting the worker
    pub(crate) fn build(
        config: RollingConfig,
    ) -> Result<(Self, CompressionWorker, AsyncRx<CompressionRequest>)> {
        config.validate()?;

        let path = std::path::absolute(&config.path).map_err(|source| SinkError::InvalidPath {
            path: config.path.display().to_string(),
            source,
        })?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let generations = GenerationRegistry::scan(&path, config.generations);
        let pending = Arc::new(PendingWork::new());
        let metrics = Arc::new(SinkMetrics::new());

        let (sender, receiver) =
            crossfire::mpsc::bounded_tx_blocking_rx_async(config.queue_capacity());

        let worker = CompressionWorker::new(
            generations,
            config.compression_level,
            Arc::clone(&pending),
            Arc::clone(&metrics),
            config.retry(),
        );

        let sink = Self {
            path,
            config,
            file: None,
            bytes_since_rotation: 0,
            sender,
            pending,
            metrics,
            error_logger: RateLimitedLogger::default(),
        };

        Ok((sink, worker, receiver))
    }

    /// Absolute path of the active file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sink configuration
    pub fn config(&self) -> &RollingConfig {
        &self.config
    }

    /// Bytes written since the last rotation
    pub fn bytes_since_rotation(&self) -> u64 {
        self.bytes_since_rotation
    }

    /// Capacity of the pending-compression queue
    pub fn queue_capacity(&self) -> usize {
        self.config.queue_capacity()
    }

    /// Snapshot of the sink and worker metrics
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Handle for waiting on this sink's compression work
    pub fn idle_handle(&self) -> SinkIdleHandle {
        SinkIdleHandle {
            name: self.path.display().to_string(),
            pending: Arc::clone(&self.pending),
        }
    }

    /// Block until every rotation issued so far has been compressed
    pub fn wait_idle(&self) {
        park_producer(|| self.pending.wait_idle());
    }

    /// Rotate now if anything was written since the last rotation
    ///
    /// Returns true if a rotated file was queued for compression.
    pub fn rotate(&mut self) -> bool {
        if self.bytes_since_rotation == 0 {
            return false;
        }
        self.file = None;
        self.bytes_since_rotation = 0;
        self.rotate_and_enqueue()
    }

    fn open_active(&self) -> io::Result<File> {
        File::options()
            .create(true)
            .append(true)
            .open(&self.path)
            .inspect_err(|e| {
                self.metrics.record_write_error();
                self.error_logger.error("open", &self.path, e);
            })
    }

    /// Rename the closed active file to a temp name and queue it
    ///
    /// Blocks while the queue is full. A failed rename queues nothing and
    /// leaves the active file where it is.
    fn rotate_and_enqueue(&mut self) -> bool {
        let temp = with_suffix(&self.path, &format!(".{}", rand::random::<u64>()));

        match fs::remove_file(&temp) {
            Ok(()) => {
                tracing::warn!(path = %temp.display(), "removed stale file at rotation target");
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %temp.display(), error = %e, "failed to clear rotation target");
            }
        }

        if let Err(e) = fs::rename(&self.path, &temp) {
            self.metrics.record_rotation_failure();
            tracing::error!(
                path = %self.path.display(),
                target = %temp.display(),
                error = %e,
                "rotation rename failed, keeping active file"
            );
            return false;
        }

        self.pending.begin();
        let request = CompressionRequest {
            source: temp.clone(),
        };
        if park_producer(|| self.sender.send(request)).is_err() {
            self.pending.finish();
            self.metrics.record_rotation_failure();
            tracing::error!(
                path = %temp.display(),
                "compression worker stopped, rotated file left uncompressed"
            );
            return false;
        }

        self.metrics.record_rotation();
        tracing::debug!(
            path = %self.path.display(),
            rotated = %temp.display(),
            "active file rotated"
        );
        true
    }
}

impl Write for RollingFileSink {
    /// Append to the active file, rotating once the threshold is reached
    ///
    /// Open and write failures are returned and the sink stays usable; the
    /// next call reopens the file if needed. Blocks while the compression
    /// queue is full.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = match self.file.take() {
            Some(file) => file,
            None => self.open_active()?,
        };

        let written = match file.write(buf) {
            Ok(n) => n,
            Err(e) => {
                self.metrics.record_write_error();
                self.error_logger.error("write", &self.path, &e);
                self.file = Some(file);
                return Err(e);
            }
        };
        self.metrics.record_write(written as u64);
        self.bytes_since_rotation += written as u64;

        if self.bytes_since_rotation >= self.config.rotation_bytes {
            drop(file);
            self.bytes_since_rotation = 0;
            self.rotate_and_enqueue();
        } else {
            self.file = Some(file);
        }

        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}
