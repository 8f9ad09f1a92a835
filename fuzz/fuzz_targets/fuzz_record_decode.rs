//! Fuzz target for the message record decoder.
//!
//! Every declared length must be validated before slicing; malformed
//! records fail cleanly and accepted ones round-trip.

#![no_main]

use libfuzzer_sys::fuzz_target;
use hush_protocol::MessageRecord;

fuzz_target!(|data: &[u8]| {
    if let Ok(record) = MessageRecord::decode(data) {
        let reencoded = record.encode().expect("decoded record re-encodes");
        assert_eq!(
            MessageRecord::decode(&reencoded).expect("re-encoded record decodes"),
            record
        );
    }
});
