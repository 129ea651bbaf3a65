//! Building blocks of the rolling sink
//!
//! - **generations**: ledger of compressed slots and the eviction policy
//! - **gzip**: reusable gzip compressor
//! - **pending**: outstanding-work counter behind `wait_idle`
//! - **compressor**: the per-sink background compression worker
//! - **rate_limited_logger**: throttled error logging for the write path
//!
//! ```text
//! [RollingFileSink] → [bounded queue] → [CompressionWorker] → [Gzipper]
//!        ↓                                      ↓
//!  [PendingWork] ←──────── finish ──────  [GenerationRegistry]
//! ```

pub mod compressor;
pub mod generations;
pub mod gzip;
pub mod pending;
pub mod rate_limited_logger;

pub use compressor::{
    CompressionRequest, CompressionWorker, DEFAULT_COMPRESS_ATTEMPTS, DEFAULT_RETRY_DELAY,
    RetryConfig, compress_path,
};
pub use generations::{COMPRESSED_EXTENSION, GenerationEntry, GenerationRegistry, strip_temp_suffix};
pub use gzip::{DEFAULT_COMPRESSION_LEVEL, Gzipper};
pub use pending::PendingWork;
pub use rate_limited_logger::{DEFAULT_LOG_INTERVAL, RateLimitedLogger};
