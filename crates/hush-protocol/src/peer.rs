//! Peer identifiers.

use serde::{Deserialize, Serialize};

/// Wire size of a peer id.
pub const PEER_ID_SIZE: usize = 8;

/// An 8-byte opaque peer identifier, conventionally 8 printable characters.
///
/// Shorter ids are left-justified and zero-padded on the wire. The legacy
/// all-0xFF broadcast sentinel is recognized on decode but never emitted;
/// outbound broadcasts simply omit the recipient field.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId([u8; PEER_ID_SIZE]);

impl PeerId {
    /// The legacy broadcast sentinel.
    pub const BROADCAST: PeerId = PeerId([0xFF; PEER_ID_SIZE]);

    /// Construct from the raw wire bytes.
    pub const fn from_bytes(bytes: [u8; PEER_ID_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse a peer id from its string form.
    ///
    /// Accepts 1..=8 bytes of UTF-8, zero-padding short ids the way the
    /// wire codec does. Returns `None` for empty or oversized input.
    pub fn parse(s: &str) -> Option<Self> {
        let raw = s.as_bytes();
        if raw.is_empty() || raw.len() > PEER_ID_SIZE {
            return None;
        }
        let mut bytes = [0u8; PEER_ID_SIZE];
        bytes[..raw.len()].copy_from_slice(raw);
        Some(Self(bytes))
    }

    /// The raw wire bytes.
    pub fn as_bytes(&self) -> &[u8; PEER_ID_SIZE] {
        &self.0
    }

    /// Whether this is the legacy broadcast sentinel.
    pub fn is_broadcast_sentinel(&self) -> bool {
        self.0 == [0xFF; PEER_ID_SIZE]
    }

    /// Printable form: the UTF-8 prefix up to the zero padding, or hex when
    /// the bytes are not valid UTF-8.
    pub fn display(&self) -> String {
        let trimmed: &[u8] = match self.0.iter().position(|&b| b == 0) {
            Some(end) => &self.0[..end],
            None => &self.0,
        };
        match std::str::from_utf8(trimmed) {
            Ok(s) => s.to_string(),
            Err(_) => self.0.iter().map(|b| format!("{:02x}", b)).collect(),
        }
    }
}

impl std::fmt::Debug for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PeerId({})", self.display())
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}
