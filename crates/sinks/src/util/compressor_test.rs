//! Tests for the compression worker

use std::io::Read;
use std::sync::Arc;

use flate2::read::GzDecoder;
use tempfile::TempDir;

use super::*;

fn gunzip_file(path: &Path) -> Vec<u8> {
    let mut decoder = GzDecoder::new(File::open(path).expect("generation file exists"));
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).expect("valid gzip");
    out
}

struct Harness {
    dir: TempDir,
    tx: crossfire::MTx<CompressionRequest>,
    pending: Arc<PendingWork>,
    metrics: Arc<SinkMetrics>,
}

impl Harness {
    fn start(limit: u32, retry: RetryConfig) -> Self {
        let dir = TempDir::new().expect("temp dir");
        let active = dir.path().join("app.log");
        let pending = Arc::new(PendingWork::new());
        let metrics = Arc::new(SinkMetrics::new());

        let (tx, rx) = crossfire::mpsc::bounded_tx_blocking_rx_async(8);
        let worker = CompressionWorker::new(
            GenerationRegistry::scan(&active, limit),
            6,
            Arc::clone(&pending),
            Arc::clone(&metrics),
            retry,
        );
        tokio::spawn(worker.run(rx));

        Self {
            dir,
            tx,
            pending,
            metrics,
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn submit(&self, source: PathBuf) {
        self.pending.begin();
        self.tx
            .send(CompressionRequest { source })
            .expect("worker alive");
    }

    fn rotate(&self, suffix: u64, contents: &[u8]) {
        let source = self.path(&format!("app.log.{suffix}"));
        fs::write(&source, contents).expect("write temp file");
        self.submit(source);
    }
}

#[test]
fn test_retry_config_default() {
    let retry = RetryConfig::default();
    assert_eq!(retry.max_attempts, DEFAULT_COMPRESS_ATTEMPTS);
    assert_eq!(retry.retry_delay, DEFAULT_RETRY_DELAY);
}

#[test]
fn test_compress_path_truncates_existing_generation() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("app.log.5");
    let destination = dir.path().join("app.log.1.gz");
    fs::write(&destination, vec![0u8; 10_000]).unwrap();
    fs::write(&source, b"fresh segment").unwrap();

    let mut gz = Gzipper::default();
    let written = compress_path(&mut gz, &source, &destination).unwrap();

    assert_eq!(fs::metadata(&destination).unwrap().len(), written);
    assert_eq!(gunzip_file(&destination), b"fresh segment");
}

#[test]
fn test_compress_path_missing_source() {
    let dir = TempDir::new().unwrap();
    let mut gz = Gzipper::default();

    let result = compress_path(
        &mut gz,
        &dir.path().join("app.log.404"),
        &dir.path().join("app.log.1.gz"),
    );

    assert!(result.is_err());
    assert!(!dir.path().join("app.log.1.gz").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_compresses_and_removes_source() {
    let h = Harness::start(3, RetryConfig::default());

    h.rotate(111, b"first segment\n");
    h.pending.wait_idle();

    assert!(!h.path("app.log.111").exists());
    assert_eq!(gunzip_file(&h.path("app.log.1.gz")), b"first segment\n");

    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.compressions, 1);
    assert_eq!(snapshot.compression_failures, 0);
    assert!(snapshot.compressed_bytes > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_processes_in_rotation_order() {
    let h = Harness::start(3, RetryConfig::default());

    h.rotate(1, b"one");
    h.rotate(2, b"two");
    h.rotate(3, b"three");
    h.pending.wait_idle();

    assert_eq!(gunzip_file(&h.path("app.log.1.gz")), b"one");
    assert_eq!(gunzip_file(&h.path("app.log.2.gz")), b"two");
    assert_eq!(gunzip_file(&h.path("app.log.3.gz")), b"three");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_overwrites_oldest_at_capacity() {
    let h = Harness::start(2, RetryConfig::default());

    h.rotate(1, b"one");
    h.rotate(2, b"two");
    h.rotate(3, b"three");
    h.pending.wait_idle();

    assert_eq!(gunzip_file(&h.path("app.log.1.gz")), b"three");
    assert_eq!(gunzip_file(&h.path("app.log.2.gz")), b"two");
    assert!(!h.path("app.log.3.gz").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_drops_missing_source_without_hanging() {
    let h = Harness::start(2, RetryConfig::default());

    h.submit(h.path("app.log.999"));
    h.pending.wait_idle();

    let snapshot = h.metrics.snapshot();
    assert_eq!(snapshot.compressions, 0);
    assert_eq!(snapshot.compression_failures, 1);

    // The next rotation still works
    h.rotate(5, b"after failure");
    h.pending.wait_idle();
    assert_eq!(h.metrics.snapshot().compressions, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_retries_before_dropping() {
    let retry = RetryConfig {
        max_attempts: 3,
        retry_delay: Duration::from_millis(1),
    };
    let h = Harness::start(2, retry);

    h.submit(h.path("app.log.999"));
    h.pending.wait_idle();

    assert_eq!(h.metrics.snapshot().compression_failures, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_leaves_malformed_name_in_place() {
    let h = Harness::start(2, RetryConfig::default());
    let odd = h.path("applog");
    fs::write(&odd, b"keep me").unwrap();

    h.submit(odd.clone());
    h.pending.wait_idle();

    assert_eq!(fs::read(&odd).unwrap(), b"keep me");
    assert_eq!(h.metrics.snapshot().compression_failures, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_worker_drains_queue_after_sender_dropped() {
    let h = Harness::start(4, RetryConfig::default());

    h.rotate(1, b"one");
    h.rotate(2, b"two");
    let Harness {
        dir, tx, pending, ..
    } = h;
    drop(tx);
    pending.wait_idle();

    assert!(dir.path().join("app.log.1.gz").exists());
    assert!(dir.path().join("app.log.2.gz").exists());
}
