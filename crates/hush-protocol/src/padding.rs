//! Length-hiding block padding for private payloads.
//!
//! Serialized records are padded up to the next block size before
//! encryption so an observer only learns the bucket, not the true length.
//! The scheme is PKCS#7-flavored: random fill, then a trailing count byte.
//! Both operations are total: when padding cannot apply (pad count would
//! exceed one byte) the data passes through unchanged, and unpadding data
//! whose trailing byte is not a plausible count is a no-op.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::limits::PADDING_BLOCKS;

/// The smallest block size strictly greater than `len`, or `len` itself
/// when the payload exceeds every block.
///
/// # Example
///
/// ```
/// use hush_protocol::padding::optimal_block_size;
///
/// assert_eq!(optimal_block_size(10), 256);
/// assert_eq!(optimal_block_size(256), 512);
/// assert_eq!(optimal_block_size(2047), 2048);
/// assert_eq!(optimal_block_size(5000), 5000);
/// ```
pub fn optimal_block_size(len: usize) -> usize {
    PADDING_BLOCKS
        .iter()
        .find(|&&block| block > len)
        .copied()
        .unwrap_or(len)
}

/// Pad `data` up to `target` bytes.
///
/// Appends `target - len - 1` random bytes followed by a count byte equal
/// to the total pad length. Returns the data unchanged when the pad count
/// would not fit in one byte (including `target <= len`).
pub fn pad(data: &[u8], target: usize) -> Vec<u8> {
    let pad_len = target.saturating_sub(data.len());
    if pad_len == 0 || pad_len > 255 {
        return data.to_vec();
    }

    let mut padded = Vec::with_capacity(target);
    padded.extend_from_slice(data);

    let mut fill = vec![0u8; pad_len - 1];
    OsRng.fill_bytes(&mut fill);
    padded.extend_from_slice(&fill);
    padded.push(pad_len as u8);
    padded
}

/// Strip padding applied by [`pad`].
///
/// Reads the trailing count byte `n` and strips `n` bytes when
/// `0 < n <= len`; otherwise the data is returned unchanged.
pub fn unpad(data: &[u8]) -> &[u8] {
    match data.last() {
        Some(&n) if n > 0 && (n as usize) <= data.len() => &data[..data.len() - n as usize],
        _ => data,
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn roundtrip_when_padding_applies(data in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let target = optimal_block_size(data.len());
            let padded = pad(&data, target);
            if padded.len() == target && target != data.len() {
                prop_assert_eq!(unpad(&padded), &data[..]);
            }
        }

        #[test]
        fn unpad_never_panics(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let out = unpad(&data);
            prop_assert!(out.len() <= data.len());
        }
    }
}
