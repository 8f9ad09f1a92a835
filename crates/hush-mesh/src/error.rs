//! Error types for the mesh engine.

use hush_protocol::PeerId;
use thiserror::Error;

/// Errors surfaced by the mesh engine.
///
/// Only caller-facing failures live here. Inbound decode, signature, and
/// decryption failures are swallowed with a log line so a hostile neighbor
/// cannot raise user-visible errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MeshError {
    /// A private send needs a completed handshake with the peer.
    #[error("No session key for peer {0}; key exchange initiated")]
    NoSharedSecret(PeerId),

    /// The encoded packet cannot fit the wire format.
    #[error("Message too large: {len} bytes exceeds {max}")]
    MessageTooLarge {
        /// Post-encode size.
        len: usize,
        /// Hard wire limit.
        max: usize,
    },

    /// Outbound encryption failed.
    #[error("Encryption failed")]
    EncryptionFailed,

    /// Outbound record or packet encoding failed.
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    /// The engine is not running.
    #[error("Mesh engine is not running")]
    NotRunning,

    /// The transport refused a write.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type for mesh operations.
pub type Result<T> = std::result::Result<T, MeshError>;
