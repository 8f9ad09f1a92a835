//! Facade error types.

use thiserror::Error;

use hush_mesh::MeshError;

/// Errors surfaced to the application.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// The node has never been started this session.
    #[error("Node is not initialized")]
    NotInitialized,

    /// The operation needs a running node.
    #[error("Node is not running")]
    NotRunning,

    /// The node is already running.
    #[error("Node is already running")]
    AlreadyRunning,

    /// The transport refused to start (permissions, radio off).
    #[error("Transport permission denied")]
    PermissionDenied,

    /// A peer id is malformed: not exactly 8 UTF-8 bytes.
    #[error("Invalid peer id: {0}")]
    InvalidPeer(String),

    /// A channel name is empty or oversized.
    #[error("Invalid channel name: {0}")]
    InvalidChannel(String),

    /// The encoded message cannot fit the wire format.
    #[error("Message too large: {0}")]
    MessageTooLarge(String),

    /// Outbound encryption failed (including a missing session key).
    #[error("Encryption failed")]
    EncryptionFailed,

    /// Inbound decryption failed.
    #[error("Decryption failed")]
    DecryptionFailed,

    /// Signing or verification failed.
    #[error("Signature operation failed")]
    SignatureFailed,

    /// The transport reported a write failure.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The configuration failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<MeshError> for NodeError {
    fn from(e: MeshError) -> Self {
        match e {
            MeshError::NoSharedSecret(_) | MeshError::EncryptionFailed => Self::EncryptionFailed,
            MeshError::MessageTooLarge { len, max } => {
                Self::MessageTooLarge(format!("{len} bytes exceeds {max}"))
            }
            MeshError::EncodingFailed(detail) => Self::MessageTooLarge(detail),
            MeshError::NotRunning => Self::NotRunning,
            MeshError::Transport(detail) => Self::NetworkError(detail),
        }
    }
}

/// Result type for facade operations.
pub type Result<T> = std::result::Result<T, NodeError>;
