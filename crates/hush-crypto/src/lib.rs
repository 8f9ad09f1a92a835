//! # hush-crypto
//!
//! Cryptographic primitives for the HUSH mesh protocol.
//!
//! This crate provides the building blocks the protocol engine composes:
//!
//! - **Key Agreement**: X25519 Diffie-Hellman
//! - **Key Derivation**: HKDF-SHA256 from the raw shared secret
//! - **Authenticated Encryption**: AES-256-GCM with random 96-bit nonces
//! - **Digital Signatures**: Ed25519 over packet payload bytes
//! - **Session Identity**: the per-session key bundle a node advertises
//!
//! ## Security
//!
//! All secret material implements `Zeroize` and is wiped on drop. Debug
//! output never prints key bytes.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod identity;
pub mod kdf;
pub mod signing;
pub mod symmetric;
pub mod x25519;

pub use error::{CryptoError, Result};
pub use identity::{PeerPublicBundle, SessionIdentity, COMBINED_PUBLIC_SIZE};
pub use kdf::derive_session_key;
pub use signing::{SigningKeyPair, SigningPublicKey, SIGNATURE_SIZE};
pub use symmetric::{decrypt, encrypt, SymmetricKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use x25519::{AgreementPublicKey, AgreementSecretKey, SharedSecret};
