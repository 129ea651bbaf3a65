//! Flush registry for rolling sinks
//!
//! Every sink registers an idle handle here when it is built. At shutdown
//! the application calls `flush_all()`, which blocks until each registered
//! sink has compressed everything it rotated so far.
//!
//! The registry is an ordinary value rather than process-wide state: create
//! one at startup, share it (usually behind an `Arc`) with the code that
//! builds sinks, and flush it before exiting.
//!
//! # Example
//!
//! ```ignore
//! use gzroll_sinks::{RollingConfig, RollingFileSink, SinkRegistry};
//!
//! let registry = SinkRegistry::new();
//! let mut sink = RollingFileSink::new(RollingConfig::new("logs/app.log"), &registry)?;
//! sink.write_all(b"hello\n")?;
//! registry.flush_all();
//! ```

use std::sync::Arc;

use parking_lot::Mutex;

/// Something a flush can wait on
///
/// Implemented by the idle handle every rolling sink hands out.
pub trait FlushTarget: Send + Sync {
    /// Name used in log lines (the sink's active path)
    fn name(&self) -> &str;

    /// Block until no compression work is pending or in flight
    fn wait_idle(&self);
}

/// Registry of sinks to wait on during a flush
#[derive(Default)]
pub struct SinkRegistry {
    targets: Mutex<Vec<Arc<dyn FlushTarget>>>,
}

impl SinkRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a target; called once per sink at construction
    pub fn register(&self, target: Arc<dyn FlushTarget>) {
        tracing::debug!(sink = %target.name(), "sink registered for flush");
        self.targets.lock().push(target);
    }

    /// Number of registered targets
    pub fn len(&self) -> usize {
        self.targets.lock().len()
    }

    /// True if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.targets.lock().is_empty()
    }

    /// Wait for every registered target to go idle
    ///
    /// No timeout and no cancellation. The target list is copied first so
    /// sinks may still register while a flush is waiting.
    pub fn flush_all(&self) {
        let targets: Vec<Arc<dyn FlushTarget>> = self.targets.lock().clone();

        for target in &targets {
            tracing::debug!(sink = %target.name(), "waiting for sink to go idle");
            target.wait_idle();
        }

        tracing::info!(sinks = targets.len(), "flush complete");
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod registry_test;
