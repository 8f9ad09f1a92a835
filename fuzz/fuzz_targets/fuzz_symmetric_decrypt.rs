//! Fuzz target for AEAD decryption.
//!
//! Arbitrary sealed blobs against a random key must fail cleanly; a
//! forged authentication is a crash here.

#![no_main]

use libfuzzer_sys::fuzz_target;
use hush_crypto::{decrypt, SymmetricKey};

fuzz_target!(|data: &[u8]| {
    let key = SymmetricKey::generate();
    // A random key cannot authenticate attacker-chosen bytes.
    assert!(decrypt(&key, data).is_err());
});
