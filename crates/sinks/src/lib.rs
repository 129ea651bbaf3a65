//! gzroll - Sinks
//!
//! Size-rotated log files whose rotations are gzipped in the background into
//! a bounded set of generations.
//!
//! # Architecture
//!
//! Each sink owns its active file and the producer end of a bounded queue.
//! A single compression task per sink drains the queue in rotation order.
//!
//! ```text
//! [write()] → app.log ──(threshold)──→ rename app.log.<rand> → [queue]
//!                                                                ↓
//!                     app.log.<id>.gz ← [GenerationRegistry] ← [worker]
//! ```
//!
//! A `SinkRegistry` collects every sink built against it so a shutdown path
//! can wait for all outstanding compression with one `flush_all()` call.
//!
//! # Example
//!
//! ```ignore
//! use std::io::Write;
//! use gzroll_sinks::{RollingConfig, RollingFileSink, SinkRegistry};
//!
//! let registry = SinkRegistry::new();
//! let config = RollingConfig::new("logs/app.log")
//!     .with_generations(5)
//!     .with_rotation_bytes(1024 * 1024);
//! let mut sink = RollingFileSink::new(config, &registry)?;
//!
//! writeln!(sink, "service started")?;
//! registry.flush_all();
//! ```

/// Rolling file sink - size rotation with gzip generations
pub mod rolling;

/// Flush registry shared by all sinks of a process
pub mod registry;

/// Building blocks: generation ledger, gzip, worker, pending counter
pub mod util;

/// Errors and metrics shared by the sink and its worker
mod common;

pub use common::{MetricsSnapshot, Result, SinkError, SinkMetrics};
pub use registry::{FlushTarget, SinkRegistry};
pub use rolling::{RollingConfig, RollingFileSink, SinkIdleHandle};
