//! Fuzz target for block padding.
//!
//! Both operations are total: arbitrary input may pass through
//! unchanged but must never panic, and applied padding must strip back
//! to the original bytes.

#![no_main]

use libfuzzer_sys::fuzz_target;
use hush_protocol::padding::{optimal_block_size, pad, unpad};

fuzz_target!(|data: &[u8]| {
    // Unpadding arbitrary bytes never panics and never grows the input.
    let stripped = unpad(data);
    assert!(stripped.len() <= data.len());

    let target = optimal_block_size(data.len());
    let padded = pad(data, target);
    if padded.len() == target && target != data.len() {
        // Padding applied: it must strip back exactly.
        assert_eq!(unpad(&padded), data);
    } else {
        // Padding could not apply; the data is untouched.
        assert_eq!(padded, data);
    }
});
