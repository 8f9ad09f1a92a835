//! Per-session key bundle.
//!
//! A node generates three fresh keypairs at session start: an X25519
//! agreement pair, an Ed25519 signing pair, and an Ed25519 identity pair.
//! The three public halves concatenate into the 96-byte bundle carried by
//! KEY_EXCHANGE packets; peers split it back with [`PeerPublicBundle`].

use sha2::{Digest, Sha256};

use crate::signing::{SigningKeyPair, SigningPublicKey, SIGNING_KEY_SIZE};
use crate::x25519::{AgreementPublicKey, AgreementSecretKey, AGREEMENT_KEY_SIZE};
use crate::{CryptoError, Result};

/// Size of the combined public bundle: agreement + signing + identity keys.
pub const COMBINED_PUBLIC_SIZE: usize = AGREEMENT_KEY_SIZE + 2 * SIGNING_KEY_SIZE;

/// The local session's private key material.
///
/// Created at `start()`, dropped (and zeroized field by field) at `stop()`.
pub struct SessionIdentity {
    agreement: AgreementSecretKey,
    signing: SigningKeyPair,
    identity: SigningKeyPair,
}

impl SessionIdentity {
    /// Generate a fresh session identity.
    pub fn generate() -> Self {
        Self {
            agreement: AgreementSecretKey::generate(),
            signing: SigningKeyPair::generate(),
            identity: SigningKeyPair::generate(),
        }
    }

    /// The X25519 secret used for key agreement.
    pub fn agreement(&self) -> &AgreementSecretKey {
        &self.agreement
    }

    /// The signing keypair used to authenticate packets.
    pub fn signing(&self) -> &SigningKeyPair {
        &self.signing
    }

    /// The 96-byte public bundle sent in KEY_EXCHANGE packets.
    pub fn combined_public(&self) -> [u8; COMBINED_PUBLIC_SIZE] {
        let mut out = [0u8; COMBINED_PUBLIC_SIZE];
        out[..32].copy_from_slice(self.agreement.public_key().as_bytes());
        out[32..64].copy_from_slice(self.signing.public_key().as_bytes());
        out[64..].copy_from_slice(self.identity.public_key().as_bytes());
        out
    }

    /// SHA-256 digest of the combined public bundle.
    ///
    /// Short enough for BLE manufacturer data; lets a scanner recognize an
    /// already-handshaken peer before any GATT exchange.
    pub fn public_digest(&self) -> [u8; 32] {
        Sha256::digest(self.combined_public()).into()
    }
}

impl std::fmt::Debug for SessionIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionIdentity {{ signing: {:?} }}", self.signing.public_key())
    }
}

/// A peer's public bundle, split from the 96-byte KEY_EXCHANGE payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerPublicBundle {
    /// The peer's X25519 agreement key.
    pub agreement: AgreementPublicKey,
    /// The peer's Ed25519 packet-signing key.
    pub signing: SigningPublicKey,
    /// The peer's Ed25519 identity key.
    pub identity: SigningPublicKey,
}

impl PeerPublicBundle {
    /// Split a 96-byte bundle into its three keys, validating each.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != COMBINED_PUBLIC_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: COMBINED_PUBLIC_SIZE,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            agreement: AgreementPublicKey::from_bytes(&bytes[..32])?,
            signing: SigningPublicKey::from_bytes(&bytes[32..64])?,
            identity: SigningPublicKey::from_bytes(&bytes[64..])?,
        })
    }

    /// SHA-256 digest of the bundle as it appeared on the wire.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.agreement.as_bytes());
        hasher.update(self.signing.as_bytes());
        hasher.update(self.identity.as_bytes());
        hasher.finalize().into()
    }
}
