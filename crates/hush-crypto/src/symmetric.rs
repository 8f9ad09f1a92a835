//! AES-256-GCM authenticated encryption.
//!
//! Private message payloads are sealed as `nonce || ciphertext || tag` with
//! a fresh random 96-bit nonce per message.
//!
//! ## Security Notes
//!
//! - Keys are zeroized on drop
//! - Nonces come from `OsRng`; never reuse a nonce with the same key

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{CryptoError, Result};

/// Size of a session key in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

/// Size of a GCM nonce in bytes (96 bits).
pub const NONCE_SIZE: usize = 12;

/// Size of the GCM authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// A 256-bit AES-GCM session key derived per peer.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_SIZE]);

impl SymmetricKey {
    /// Generate a random key. Session keys normally come from the KDF;
    /// this exists for tests and tooling.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create a key from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// The key as raw bytes. Never log or persist these.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SymmetricKey([REDACTED])")
    }
}

/// Encrypt `plaintext`, returning `nonce || ciphertext || tag`.
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::Encryption)?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypt a `nonce || ciphertext || tag` blob produced by [`encrypt`].
///
/// Fails with [`CryptoError::Decryption`] on truncated input, a wrong key,
/// or any tag mismatch.
pub fn decrypt(key: &SymmetricKey, sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::Decryption);
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);

    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Decryption)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = SymmetricKey::generate();
        let sealed = encrypt(&key, b"secret").unwrap();
        let opened = decrypt(&key, &sealed).unwrap();

        assert_eq!(opened, b"secret");
    }

    #[test]
    fn wire_layout_is_nonce_ct_tag() {
        let key = SymmetricKey::generate();
        let sealed = encrypt(&key, b"hello").unwrap();

        assert_eq!(sealed.len(), NONCE_SIZE + 5 + TAG_SIZE);
    }

    #[test]
    fn decrypt_fails_with_wrong_key() {
        let key = SymmetricKey::generate();
        let other = SymmetricKey::generate();
        let sealed = encrypt(&key, b"secret").unwrap();

        assert!(matches!(decrypt(&other, &sealed), Err(CryptoError::Decryption)));
    }

    #[test]
    fn decrypt_fails_on_tampering() {
        let key = SymmetricKey::generate();
        let mut sealed = encrypt(&key, b"secret").unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;

        assert!(matches!(decrypt(&key, &sealed), Err(CryptoError::Decryption)));
    }

    #[test]
    fn decrypt_fails_on_truncated_input() {
        let key = SymmetricKey::generate();
        assert!(matches!(decrypt(&key, &[0u8; 5]), Err(CryptoError::Decryption)));
        assert!(matches!(decrypt(&key, &[]), Err(CryptoError::Decryption)));
    }

    #[test]
    fn nonces_are_fresh() {
        let key = SymmetricKey::generate();
        let a = encrypt(&key, b"same").unwrap();
        let b = encrypt(&key, b"same").unwrap();

        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
        assert_ne!(a, b);
    }

    #[test]
    fn empty_plaintext_roundtrip() {
        let key = SymmetricKey::generate();
        let sealed = encrypt(&key, b"").unwrap();
        assert_eq!(decrypt(&key, &sealed).unwrap(), b"");
    }

    #[test]
    fn key_from_bytes_validates_length() {
        assert!(SymmetricKey::from_bytes(&[0u8; 32]).is_ok());
        assert!(matches!(
            SymmetricKey::from_bytes(&[0u8; 31]),
            Err(CryptoError::InvalidKeyLength { expected: 32, actual: 31 })
        ));
    }
}
