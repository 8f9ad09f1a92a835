//! X25519 Diffie-Hellman key agreement.
//!
//! Each session generates a fresh agreement keypair; the raw shared secret
//! is never used directly, it feeds [`crate::kdf::derive_session_key`].
//!
//! ## Security Notes
//!
//! - Secret keys and shared secrets are zeroized on drop
//! - Keys are generated from `OsRng`

use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{CryptoError, Result};

/// Size of an X25519 public key in bytes.
pub const AGREEMENT_KEY_SIZE: usize = 32;

/// An X25519 public key announced to peers for key agreement.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementPublicKey([u8; AGREEMENT_KEY_SIZE]);

impl AgreementPublicKey {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; AGREEMENT_KEY_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
                expected: AGREEMENT_KEY_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// The key as raw bytes.
    pub fn as_bytes(&self) -> &[u8; AGREEMENT_KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for AgreementPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AgreementPublicKey({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// An X25519 secret key held for the lifetime of a session.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct AgreementSecretKey([u8; AGREEMENT_KEY_SIZE]);

impl AgreementSecretKey {
    /// Generate a fresh secret key.
    pub fn generate() -> Self {
        Self(StaticSecret::random_from_rng(OsRng).to_bytes())
    }

    /// The matching public key.
    pub fn public_key(&self) -> AgreementPublicKey {
        let secret = StaticSecret::from(self.0);
        AgreementPublicKey(PublicKey::from(&secret).to_bytes())
    }

    /// Diffie-Hellman agreement with a peer's public key.
    pub fn agree(&self, peer: &AgreementPublicKey) -> SharedSecret {
        let secret = StaticSecret::from(self.0);
        let shared = secret.diffie_hellman(&PublicKey::from(*peer.as_bytes()));
        SharedSecret(shared.to_bytes())
    }
}

impl std::fmt::Debug for AgreementSecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AgreementSecretKey([REDACTED])")
    }
}

/// A raw X25519 shared secret.
///
/// Input to the session-key KDF, never an encryption key itself.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; AGREEMENT_KEY_SIZE]);

impl SharedSecret {
    /// The shared secret as raw bytes.
    pub fn as_bytes(&self) -> &[u8; AGREEMENT_KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SharedSecret([REDACTED])")
    }
}
