//! Background compression worker
//!
//! One worker task per rolling sink. It pops rotated temp files off the
//! bounded queue in rotation order, asks the generation ledger where each
//! one goes, gzips it there and deletes the temp file.
//!
//! ```text
//! [write()] → rename → [queue] → [worker] → GenerationRegistry → app.log.N.gz
//!                                    ↓
//!                              remove app.log.<rand>
//! ```
//!
//! Failures are logged and the request is dropped once its attempts are
//! used up. The temp file is still removed and the pending count still
//! drops, so a flush can never hang on a broken path.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crossfire::AsyncRx;

use super::generations::GenerationRegistry;
use super::gzip::Gzipper;
use super::pending::PendingWork;
use crate::common::SinkMetrics;

/// Default compression attempts per rotated file (no retry)
pub const DEFAULT_COMPRESS_ATTEMPTS: usize = 1;

/// Default delay between compression attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(10);

/// A rotated file waiting to be compressed
///
/// Owned by the worker once dequeued; the worker deletes the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionRequest {
    /// Temp path the active file was renamed to
    pub source: PathBuf,
}

/// Retry behaviour for failed compressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts, at least 1
    pub max_attempts: usize,

    /// Delay between attempts
    pub retry_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_COMPRESS_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Compression worker state
///
/// Owns the generation ledger and the gzip context; neither is shared.
pub struct CompressionWorker {
    /// Generation slots for this sink
    generations: GenerationRegistry,

    /// Reusable compressor, lent to the blocking pool per job
    gzipper: Option<Gzipper>,

    /// Level used if the compressor has to be rebuilt
    level: u32,

    /// Outstanding work shared with the producer
    pending: Arc<PendingWork>,

    /// Metrics shared with the producer
    metrics: Arc<SinkMetrics>,

    /// Retry behaviour
    retry: RetryConfig,
}

impl CompressionWorker {
    /// Create a worker around an already scanned ledger
    pub fn new(
        generations: GenerationRegistry,
        level: u32,
        pending: Arc<PendingWork>,
        metrics: Arc<SinkMetrics>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            generations,
            gzipper: Some(Gzipper::new(level)),
            level,
            pending,
            metrics,
            retry,
        }
    }

    /// Process requests until every sender is gone and the queue is drained
    pub async fn run(mut self, receiver: AsyncRx<CompressionRequest>) {
        tracing::debug!(
            path = %self.generations.active_path().display(),
            generations = self.generations.len(),
            "compression worker starting"
        );

        while let Ok(request) = receiver.recv().await {
            self.handle(request).await;
        }

        tracing::debug!(
            path = %self.generations.active_path().display(),
            "compression worker finished"
        );
    }

    /// Compress one rotated file into its generation slot
    ///
    /// The source is removed afterwards, whether or not compression
    /// succeeded. A malformed temp name with no slot is the exception: it is
    /// left on disk uncompressed.
    async fn handle(&mut self, request: CompressionRequest) {
        let source = request.source;
        let destination = self.generations.destination_for(&source);

        if destination == source {
            // Degraded fallback from the ledger: nowhere safe to write, keep the data
            tracing::error!(
                path = %source.display(),
                "no generation slot for rotated file, leaving it uncompressed"
            );
            self.metrics.record_compression_failure();
            self.pending.finish();
            return;
        }

        let max_attempts = self.retry.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.compress_file(&source, &destination).await {
                Ok(bytes) => {
                    self.metrics.record_compression(bytes);
                    tracing::debug!(
                        source = %source.display(),
                        destination = %destination.display(),
                        compressed_bytes = bytes,
                        "rotated file compressed"
                    );
                    break;
                }
                Err(e) if attempt < max_attempts => {
                    tracing::warn!(
                        source = %source.display(),
                        destination = %destination.display(),
                        error = %e,
                        attempt,
                        max_attempts,
                        "compression failed, retrying"
                    );
                    tokio::time::sleep(self.retry.retry_delay).await;
                }
                Err(e) => {
                    self.metrics.record_compression_failure();
                    tracing::error!(
                        source = %source.display(),
                        destination = %destination.display(),
                        error = %e,
                        attempts = max_attempts,
                        "compression failed, dropping rotated file"
                    );
                }
            }
        }

        match fs::remove_file(&source) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %source.display(), error = %e, "failed to remove rotated file");
            }
        }

        self.pending.finish();
    }

    /// Run one compression on the blocking pool with the worker's gzip context
    async fn compress_file(&mut self, source: &Path, destination: &Path) -> io::Result<u64> {
        let mut gzipper = self
            .gzipper
            .take()
            .unwrap_or_else(|| Gzipper::new(self.level));
        let source = source.to_path_buf();
        let destination = destination.to_path_buf();

        let (gzipper, result) = tokio::task::spawn_blocking(move || {
            let result = compress_path(&mut gzipper, &source, &destination);
            (gzipper, result)
        })
        .await
        .map_err(io::Error::other)?;

        self.gzipper = Some(gzipper);
        result
    }
}

/// Gzip `source` into `destination`, truncating any previous generation
pub fn compress_path(gzipper: &mut Gzipper, source: &Path, destination: &Path) -> io::Result<u64> {
    let input = File::open(source)?;
    let output = File::options()
        .create(true)
        .write(true)
        .truncate(true)
        .open(destination)?;
    gzipper.compress(input, output)
}

#[cfg(test)]
#[path = "compressor_test.rs"]
mod compressor_test;
