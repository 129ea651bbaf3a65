//! Reusable gzip compressor
//!
//! The compression worker turns every rotated file into a `.gz` generation.
//! Rather than building a fresh deflate context per file, it owns one
//! `Gzipper` and resets it at the start of every run. The raw deflate
//! stream is wrapped in a gzip member by hand (RFC 1952 header and
//! CRC32/ISIZE trailer), so the output reads with any gzip decoder.
//!
//! # Example
//!
//! ```ignore
//! use std::fs::File;
//! use gzroll_sinks::util::Gzipper;
//!
//! let mut gz = Gzipper::default();
//! let src = File::open("app.log.123")?;
//! let dst = File::create("app.log.1.gz")?;
//! let written = gz.compress(src, dst)?;
//! ```

use std::io::{self, BufWriter, ErrorKind, Read, Write};

use flate2::{Compress, Compression, Crc, FlushCompress, Status};

/// Default read/write buffer size (64KB)
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Default compression level (zlib's default trade-off)
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Gzip member header: magic, CM=deflate, no flags, no mtime, XFL=0, OS=unknown
const GZIP_HEADER: [u8; 10] = [0x1f, 0x8b, 0x08, 0x00, 0, 0, 0, 0, 0x00, 0xff];

/// Gzip compressor whose deflate state and buffers are reused across files
pub struct Gzipper {
    deflate: Compress,
    crc: Crc,
    in_buf: Vec<u8>,
    out_buf: Vec<u8>,
}

impl Gzipper {
    /// Create a compressor at `level` (0 = store, 9 = best)
    pub fn new(level: u32) -> Self {
        Self::with_buffer_size(level, DEFAULT_BUFFER_SIZE)
    }

    /// Create a compressor with custom buffer sizes
    pub fn with_buffer_size(level: u32, buffer_size: usize) -> Self {
        let buffer_size = buffer_size.max(1);
        Self {
            deflate: Compress::new(Compression::new(level.min(9)), false),
            crc: Crc::new(),
            in_buf: vec![0; buffer_size],
            out_buf: vec![0; buffer_size],
        }
    }

    /// Compress all of `input` into a single gzip member written to `output`
    ///
    /// Resets the deflate context first, so a previous failed run never
    /// leaks into this one. Returns the number of compressed bytes written.
    pub fn compress<R: Read, W: Write>(&mut self, mut input: R, output: W) -> io::Result<u64> {
        self.deflate.reset();
        self.crc.reset();

        let mut out = CountingWriter::new(BufWriter::new(output));
        out.write_all(&GZIP_HEADER)?;

        loop {
            let n = match input.read(&mut self.in_buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            self.crc.update(&self.in_buf[..n]);
            deflate_into(
                &mut self.deflate,
                &self.in_buf[..n],
                &mut self.out_buf,
                FlushCompress::None,
                &mut out,
            )?;
        }
        deflate_into(
            &mut self.deflate,
            &[],
            &mut self.out_buf,
            FlushCompress::Finish,
            &mut out,
        )?;

        out.write_all(&self.crc.sum().to_le_bytes())?;
        out.write_all(&self.crc.amount().to_le_bytes())?;
        out.flush()?;
        Ok(out.count)
    }
}

impl Default for Gzipper {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_LEVEL)
    }
}

/// Feed `input` through `deflate`, writing everything produced to `out`
///
/// With `FlushCompress::Finish` this keeps going until the stream end
/// marker has been emitted.
fn deflate_into<W: Write>(
    deflate: &mut Compress,
    input: &[u8],
    out_buf: &mut [u8],
    flush: FlushCompress,
    out: &mut W,
) -> io::Result<()> {
    let mut consumed = 0;
    loop {
        let before_in = deflate.total_in();
        let before_out = deflate.total_out();

        let status = deflate
            .compress(&input[consumed..], out_buf, flush)
            .map_err(io::Error::other)?;

        consumed += (deflate.total_in() - before_in) as usize;
        let produced = (deflate.total_out() - before_out) as usize;
        out.write_all(&out_buf[..produced])?;

        let done = match flush {
            FlushCompress::Finish => status == Status::StreamEnd,
            _ => consumed == input.len() && produced < out_buf.len(),
        };
        if done {
            return Ok(());
        }
    }
}

/// Writer adapter that counts bytes passed through
struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
#[path = "gzip_test.rs"]
mod gzip_test;
