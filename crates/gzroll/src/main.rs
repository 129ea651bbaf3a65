//! gzroll - exercise a rolling, compressing log sink
//!
//! # Usage
//!
//! ```bash
//! # Write 1024 numbered messages into ./tmp/lw.log, 5 generations of 1KB
//! gzroll
//!
//! # Bigger run with debug logging
//! gzroll --path /var/tmp/app.log --generations 3 --rotation-bytes 65536 \
//!     --messages 100000 --log-level debug
//! ```

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use gzroll_sinks::{RollingConfig, RollingFileSink, SinkRegistry};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// gzroll - write numbered messages through a rolling gzip sink
#[derive(Parser, Debug)]
#[command(name = "gzroll")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Active log file
    #[arg(short, long, default_value = "./tmp/lw.log")]
    path: PathBuf,

    /// Compressed generations to retain
    #[arg(short, long, default_value_t = 5)]
    generations: u32,

    /// Rotate after this many bytes
    #[arg(short, long, default_value_t = 1024)]
    rotation_bytes: u64,

    /// Number of messages to write
    #[arg(short, long, default_value_t = 1024)]
    messages: u64,

    /// Gzip level (0-9)
    #[arg(long, default_value_t = 6)]
    compression_level: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let registry = SinkRegistry::new();
    let config = RollingConfig::new(&cli.path)
        .with_generations(cli.generations)
        .with_rotation_bytes(cli.rotation_bytes)
        .with_compression_level(cli.compression_level);
    let sink = RollingFileSink::new(config, &registry)
        .with_context(|| format!("failed to create sink at {}", cli.path.display()))?;

    // Writes block on a full compression queue; keep them off the async workers
    let messages = cli.messages;
    let sink = tokio::task::spawn_blocking(move || write_messages(sink, messages))
        .await
        .context("writer task panicked")??;

    registry.flush_all();

    let snapshot = sink.metrics();
    tracing::info!(
        path = %sink.path().display(),
        messages,
        bytes_written = snapshot.bytes_written,
        rotations = snapshot.rotations,
        compressions = snapshot.compressions,
        compression_failures = snapshot.compression_failures,
        compressed_bytes = snapshot.compressed_bytes,
        "run complete"
    );

    Ok(())
}

fn write_messages(mut sink: RollingFileSink, messages: u64) -> Result<RollingFileSink> {
    for i in 0..messages {
        writeln!(sink, "Message number {i}")
            .with_context(|| format!("failed writing message {i}"))?;
    }
    sink.flush().context("failed flushing active file")?;
    Ok(sink)
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}
