//! Outstanding compression work counter
//!
//! The producer bumps the counter before a rotated file is queued and the
//! worker drops it once that file has been handled, so `wait_idle` can
//! block a flush until the queue and the in-flight job are both empty.

use parking_lot::{Condvar, Mutex};

/// Count of queued plus in-flight compression requests
#[derive(Debug, Default)]
pub struct PendingWork {
    count: Mutex<usize>,
    idle: Condvar,
}

impl PendingWork {
    /// Create an idle counter
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one more outstanding request
    pub fn begin(&self) {
        *self.count.lock() += 1;
    }

    /// Mark one request as handled, waking waiters when none remain
    pub fn finish(&self) {
        let mut count = self.count.lock();
        debug_assert!(*count > 0, "finish without matching begin");
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    /// Number of outstanding requests
    pub fn outstanding(&self) -> usize {
        *self.count.lock()
    }

    /// Block until no requests are outstanding
    pub fn wait_idle(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.idle.wait(&mut count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_idle_when_new() {
        let pending = PendingWork::new();
        assert_eq!(pending.outstanding(), 0);
        // Must not block
        pending.wait_idle();
    }

    #[test]
    fn test_begin_finish_counts() {
        let pending = PendingWork::new();
        pending.begin();
        pending.begin();
        assert_eq!(pending.outstanding(), 2);

        pending.finish();
        assert_eq!(pending.outstanding(), 1);
        pending.finish();
        assert_eq!(pending.outstanding(), 0);
    }

    #[test]
    fn test_wait_idle_blocks_until_finished() {
        let pending = Arc::new(PendingWork::new());
        let done = Arc::new(AtomicBool::new(false));
        pending.begin();
        pending.begin();

        let worker = {
            let pending = Arc::clone(&pending);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                pending.finish();
                thread::sleep(Duration::from_millis(20));
                done.store(true, Ordering::SeqCst);
                pending.finish();
            })
        };

        pending.wait_idle();
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(pending.outstanding(), 0);
        worker.join().unwrap();
    }
}
