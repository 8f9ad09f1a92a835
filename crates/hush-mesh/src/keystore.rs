//! Per-peer key material and the local session identity.
//!
//! Holds the peer's three announced public keys and the AES-256-GCM
//! session key derived from the X25519 agreement. All writes go through
//! the coordinator, so the store is plain owned data.

use std::collections::HashMap;

use hush_crypto::{
    decrypt, derive_session_key, encrypt, PeerPublicBundle, SessionIdentity, SigningPublicKey,
    SymmetricKey, SIGNATURE_SIZE,
};
use hush_protocol::PeerId;
use tracing::debug;

use crate::error::{MeshError, Result};

/// Everything known about one handshaken peer.
pub struct PeerKeys {
    /// The peer's announced key bundle.
    pub bundle: PeerPublicBundle,
    /// The derived AES-256-GCM session key.
    pub session_key: SymmetricKey,
}

/// The session identity plus per-peer derived keys.
pub struct KeyStore {
    identity: SessionIdentity,
    peers: HashMap<PeerId, PeerKeys>,
}

impl KeyStore {
    /// Wrap a freshly generated session identity.
    pub fn new(identity: SessionIdentity) -> Self {
        Self {
            identity,
            peers: HashMap::new(),
        }
    }

    /// The 96-byte public bundle we announce in KEY_EXCHANGE packets.
    pub fn combined_public(&self) -> [u8; hush_crypto::COMBINED_PUBLIC_SIZE] {
        self.identity.combined_public()
    }

    /// SHA-256 digest of our combined public bundle.
    pub fn public_digest(&self) -> [u8; 32] {
        self.identity.public_digest()
    }

    /// Record a peer's 96-byte bundle and derive the session key.
    ///
    /// Idempotent: a repeated exchange from an already-keyed peer never
    /// rotates the established key. Returns `true` when a new session key
    /// was derived.
    pub fn add_peer_key(&mut self, peer: PeerId, bundle_bytes: &[u8]) -> Result<bool> {
        if self.peers.contains_key(&peer) {
            debug!(%peer, "key exchange repeated; keeping established session key");
            return Ok(false);
        }

        let bundle = PeerPublicBundle::from_bytes(bundle_bytes)
            .map_err(|e| MeshError::EncodingFailed(e.to_string()))?;
        let shared = self.identity.agreement().agree(&bundle.agreement);
        let session_key = derive_session_key(&shared);

        self.peers.insert(peer, PeerKeys { bundle, session_key });
        debug!(%peer, "session key established");
        Ok(true)
    }

    /// Whether the handshake with `peer` has completed.
    pub fn has_session(&self, peer: &PeerId) -> bool {
        self.peers.contains_key(peer)
    }

    /// The announced digest of a peer's bundle, when known.
    pub fn peer_digest(&self, peer: &PeerId) -> Option<[u8; 32]> {
        self.peers.get(peer).map(|k| k.bundle.digest())
    }

    /// Encrypt for a handshaken peer.
    pub fn encrypt_for(&self, peer: &PeerId, plaintext: &[u8]) -> Result<Vec<u8>> {
        let keys = self
            .peers
            .get(peer)
            .ok_or(MeshError::NoSharedSecret(*peer))?;
        encrypt(&keys.session_key, plaintext).map_err(|_| MeshError::EncryptionFailed)
    }

    /// Decrypt from a handshaken peer. `None` on missing key or any
    /// authentication failure; inbound failures are not caller errors.
    pub fn decrypt_from(&self, peer: &PeerId, sealed: &[u8]) -> Option<Vec<u8>> {
        let keys = self.peers.get(peer)?;
        decrypt(&keys.session_key, sealed).ok()
    }

    /// Sign bytes with the session signing key.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.identity.signing().sign(message)
    }

    /// A clone of the signing public key for out-of-band checks.
    pub fn signing_public(&self) -> SigningPublicKey {
        self.identity.signing().public_key()
    }

    /// Verify a peer's signature. `false` when the peer never handshook.
    pub fn verify(&self, peer: &PeerId, message: &[u8], signature: &[u8; SIGNATURE_SIZE]) -> bool {
        match self.peers.get(peer) {
            Some(keys) => keys.bundle.signing.verify(message, signature),
            None => false,
        }
    }

    /// Forget one peer's keys.
    pub fn remove_peer(&mut self, peer: &PeerId) {
        self.peers.remove(peer);
    }

    /// Wipe all peer keys (session stop). The identity itself zeroizes
    /// when the store is dropped.
    pub fn clear(&mut self) {
        self.peers.clear();
    }

    /// Number of established sessions.
    pub fn session_count(&self) -> usize {
        self.peers.len()
    }
}
