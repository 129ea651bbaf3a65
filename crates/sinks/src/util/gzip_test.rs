//! Tests for the reusable gzip compressor

use std::io::Read;

use flate2::read::GzDecoder;

use super::*;

fn gunzip(data: &[u8]) -> Vec<u8> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).expect("valid gzip stream");
    out
}

#[test]
fn test_compress_small_input() {
    let mut gz = Gzipper::default();
    let mut out = Vec::new();

    let written = gz.compress(&b"hello world\n"[..], &mut out).unwrap();

    assert_eq!(written, out.len() as u64);
    assert_eq!(&out[..2], &[0x1f, 0x8b]);
    assert_eq!(gunzip(&out), b"hello world\n");
}

#[test]
fn test_compress_empty_input() {
    let mut gz = Gzipper::default();
    let mut out = Vec::new();

    gz.compress(&b""[..], &mut out).unwrap();

    assert!(gunzip(&out).is_empty());
}

#[test]
fn test_compress_larger_than_buffers() {
    // Tiny buffers force many deflate calls per read and many reads
    let mut gz = Gzipper::with_buffer_size(DEFAULT_COMPRESSION_LEVEL, 16);
    let input: Vec<u8> = (0..10_000u32)
        .flat_map(|i| format!("Message number {i}\n").into_bytes())
        .collect();
    let mut out = Vec::new();

    gz.compress(&input[..], &mut out).unwrap();

    assert!(out.len() < input.len());
    assert_eq!(gunzip(&out), input);
}

#[test]
fn test_reuse_across_files() {
    let mut gz = Gzipper::default();

    let mut first = Vec::new();
    gz.compress(&b"first segment"[..], &mut first).unwrap();

    let mut second = Vec::new();
    gz.compress(&b"second segment, longer than the first"[..], &mut second)
        .unwrap();

    assert_eq!(gunzip(&first), b"first segment");
    assert_eq!(gunzip(&second), b"second segment, longer than the first");
}

#[test]
fn test_store_level() {
    let mut gz = Gzipper::new(0);
    let input = vec![b'a'; 4096];
    let mut out = Vec::new();

    gz.compress(&input[..], &mut out).unwrap();

    assert_eq!(gunzip(&out), input);
}

#[test]
fn test_level_clamped() {
    let mut gz = Gzipper::new(42);
    let mut out = Vec::new();

    gz.compress(&b"clamped"[..], &mut out).unwrap();

    assert_eq!(gunzip(&out), b"clamped");
}

#[test]
fn test_reset_after_failed_run() {
    struct FailingReader {
        served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.served {
                return Err(io::Error::other("disk went away"));
            }
            self.served = true;
            let data = b"partial data";
            buf[..data.len()].copy_from_slice(data);
            Ok(data.len())
        }
    }

    let mut gz = Gzipper::default();
    let mut broken = Vec::new();
    assert!(gz.compress(FailingReader { served: false }, &mut broken).is_err());

    let mut out = Vec::new();
    gz.compress(&b"clean run"[..], &mut out).unwrap();
    assert_eq!(gunzip(&out), b"clean run");
}
