//! Session-key derivation.
//!
//! The raw X25519 shared secret is stretched into the AES-256-GCM session
//! key with HKDF-SHA256. The salt is a fixed protocol string so both sides
//! derive the same key with no extra round trip; the info parameter is
//! empty.

use hkdf::Hkdf;
use sha2::Sha256;

use crate::symmetric::{SymmetricKey, KEY_SIZE};
use crate::x25519::SharedSecret;

/// HKDF salt pinning the derivation to this protocol generation.
pub const KDF_SALT: &[u8] = b"bitchat-v1";

/// Derive the per-peer AES-256-GCM session key from a shared secret.
pub fn derive_session_key(shared: &SharedSecret) -> SymmetricKey {
    let hkdf = Hkdf::<Sha256>::new(Some(KDF_SALT), shared.as_bytes());
    let mut okm = [0u8; KEY_SIZE];
    hkdf.expand(&[], &mut okm)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    SymmetricKey::from_bytes(&okm).expect("fixed-size output")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x25519::AgreementSecretKey;

    #[test]
    fn both_sides_derive_the_same_key() {
        let alice = AgreementSecretKey::generate();
        let bob = AgreementSecretKey::generate();

        let k_alice = derive_session_key(&alice.agree(&bob.public_key()));
        let k_bob = derive_session_key(&bob.agree(&alice.public_key()));

        assert_eq!(k_alice.as_bytes(), k_bob.as_bytes());
    }

    #[test]
    fn key_differs_from_raw_secret() {
        let alice = AgreementSecretKey::generate();
        let bob = AgreementSecretKey::generate();

        let shared = alice.agree(&bob.public_key());
        let derived = derive_session_key(&shared);

        assert_ne!(derived.as_bytes(), shared.as_bytes());
    }

    #[test]
    fn derived_key_encrypts() {
        let alice = AgreementSecretKey::generate();
        let bob = AgreementSecretKey::generate();

        let key = derive_session_key(&alice.agree(&bob.public_key()));
        let sealed = crate::encrypt(&key, b"over the mesh").unwrap();
        assert_eq!(crate::decrypt(&key, &sealed).unwrap(), b"over the mesh");
    }
}
