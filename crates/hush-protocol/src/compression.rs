//! Payload compression.
//!
//! Payloads are DEFLATE-compressed when a cheap heuristic says it is worth
//! trying and the result actually pays for itself. The decoder never
//! second-guesses: it obeys the packet's compression flag, subject to bomb
//! guards (a declared-length check and a hard output cap).

use std::io::Read;

use flate2::read::{DeflateDecoder, DeflateEncoder};
use flate2::Compression;
use thiserror::Error;

use crate::limits::{
    COMPRESSION_MAX_RATIO, COMPRESSION_MIN_ENTROPY, COMPRESSION_MIN_LEN, MAX_DECOMPRESSED_LEN,
};

/// Leading bytes of formats that are already compressed.
const COMPRESSED_MAGIC: &[[u8; 2]] = &[
    [0x1F, 0x8B], // gzip
    [0x78, 0x9C], // zlib
    [0x04, 0x22], // lz4 frame
];

/// Errors raised while expanding a compressed payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompressionError {
    /// The DEFLATE stream was malformed.
    #[error("Malformed DEFLATE stream")]
    BadStream,

    /// The output did not match the declared original length.
    #[error("Decompressed length {actual} does not match declared {declared}")]
    LengthMismatch {
        /// Length declared in the wire prefix.
        declared: usize,
        /// Length actually produced.
        actual: usize,
    },

    /// The output exceeded the hard decompression cap.
    #[error("Decompressed payload exceeds {MAX_DECOMPRESSED_LEN} byte cap")]
    TooLarge,
}

/// Shannon entropy of `data` in bits per byte.
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut counts = [0usize; 256];
    for &b in data {
        counts[b as usize] += 1;
    }
    let len = data.len() as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Whether the encoder should bother running DEFLATE over `payload`.
pub fn worth_attempting(payload: &[u8]) -> bool {
    if payload.len() < COMPRESSION_MIN_LEN {
        return false;
    }
    if COMPRESSED_MAGIC.iter().any(|m| payload.starts_with(m)) {
        return false;
    }
    shannon_entropy(payload) >= COMPRESSION_MIN_ENTROPY
}

/// Try to compress `payload`.
///
/// Returns `Some(compressed)` only when the heuristic passes and the
/// compressed form is at most [`COMPRESSION_MAX_RATIO`] of the original;
/// `None` means "send it raw".
pub fn compress(payload: &[u8]) -> Option<Vec<u8>> {
    if !worth_attempting(payload) {
        return None;
    }

    let mut encoder = DeflateEncoder::new(payload, Compression::default());
    let mut compressed = Vec::new();
    encoder.read_to_end(&mut compressed).ok()?;

    let budget = (payload.len() as f64 * COMPRESSION_MAX_RATIO) as usize;
    (compressed.len() <= budget).then_some(compressed)
}

/// Expand a compressed payload section back to `declared_len` bytes.
pub fn decompress(compressed: &[u8], declared_len: usize) -> Result<Vec<u8>, CompressionError> {
    if declared_len > MAX_DECOMPRESSED_LEN {
        return Err(CompressionError::TooLarge);
    }

    let mut decoder = DeflateDecoder::new(compressed).take(MAX_DECOMPRESSED_LEN as u64 + 1);
    let mut output = Vec::with_capacity(declared_len);
    decoder
        .read_to_end(&mut output)
        .map_err(|_| CompressionError::BadStream)?;

    if output.len() > MAX_DECOMPRESSED_LEN {
        return Err(CompressionError::TooLarge);
    }
    if output.len() != declared_len {
        return Err(CompressionError::LengthMismatch {
            declared: declared_len,
            actual: output.len(),
        });
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Compressible text above the length and entropy gates.
    fn sample_text() -> Vec<u8> {
        "the quick brown fox jumps over the lazy dog; "
            .repeat(8)
            .into_bytes()
    }

    #[test]
    fn entropy_extremes() {
        assert_eq!(shannon_entropy(&[]), 0.0);
        assert_eq!(shannon_entropy(&[7u8; 1000]), 0.0);

        let uniform: Vec<u8> = (0..=255u8).collect();
        assert!((shannon_entropy(&uniform) - 8.0).abs() < 1e-9);
    }

    #[test]
    fn english_text_entropy_passes_gate() {
        assert!(shannon_entropy(&sample_text()) >= 4.0);
    }

    #[test]
    fn short_payloads_are_skipped() {
        assert!(!worth_attempting(&[b'a'; 99]));
        assert!(compress(&[b'a'; 99]).is_none());
    }

    #[test]
    fn known_compressed_magic_is_skipped() {
        let mut gzipped = vec![0x1F, 0x8B];
        gzipped.extend_from_slice(&sample_text());
        assert!(!worth_attempting(&gzipped));

        let mut zlibbed = vec![0x78, 0x9C];
        zlibbed.extend_from_slice(&sample_text());
        assert!(!worth_attempting(&zlibbed));
    }

    #[test]
    fn low_entropy_is_skipped() {
        // A run of a single byte compresses superbly but fails the gate.
        assert!(!worth_attempting(&[b'x'; 1000]));
    }

    #[test]
    fn compress_decompress_roundtrip() {
        let payload = sample_text();
        let compressed = compress(&payload).expect("repetitive text should compress");

        assert!(compressed.len() <= payload.len() * 4 / 5);
        assert_eq!(decompress(&compressed, payload.len()).unwrap(), payload);
    }

    #[test]
    fn incompressible_payload_is_rejected_by_ratio() {
        // Random bytes pass the entropy gate but cannot shrink 20%.
        let mut payload = vec![0u8; 4096];
        let mut seed = 0x12345678u32;
        for b in payload.iter_mut() {
            seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
            *b = (seed >> 24) as u8;
        }
        assert!(worth_attempting(&payload));
        assert!(compress(&payload).is_none());
    }

    #[test]
    fn decompress_rejects_length_mismatch() {
        let payload = sample_text();
        let compressed = compress(&payload).unwrap();

        let result = decompress(&compressed, payload.len() + 1);
        assert!(matches!(result, Err(CompressionError::LengthMismatch { .. })));
    }

    #[test]
    fn decompress_rejects_garbage() {
        let result = decompress(&[0xDE, 0xAD, 0xBE, 0xEF], 64);
        assert!(matches!(result, Err(CompressionError::BadStream)));
    }

    #[test]
    fn decompress_rejects_oversized_declaration() {
        let result = decompress(&[0x00], MAX_DECOMPRESSED_LEN + 1);
        assert!(matches!(result, Err(CompressionError::TooLarge)));
    }
}
