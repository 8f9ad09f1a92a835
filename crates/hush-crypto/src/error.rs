//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors that can occur during cryptographic operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// A key had the wrong length.
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length in bytes.
        expected: usize,
        /// Actual key length in bytes.
        actual: usize,
    },

    /// A public key failed point validation.
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// A signature had the wrong length or format.
    #[error("Invalid signature encoding")]
    InvalidSignature,

    /// Encryption failed.
    #[error("Encryption failed")]
    Encryption,

    /// Decryption failed (tag mismatch, wrong key, or malformed input).
    #[error("Decryption failed: invalid ciphertext or key")]
    Decryption,
}

/// Result type for cryptographic operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
