//! The transport driver contract.
//!
//! The engine never talks BLE. A driver advertises, scans, and shuttles
//! GATT bytes; the engine consumes `(peer, bytes)` events and emits
//! `(peer?, bytes)` commands. In production the driver wraps the
//! platform's BLE stack; in tests [`ChannelTransport`] wires engines
//! together over in-process channels.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use hush_protocol::PeerId;

/// Fixed 128-bit GATT service UUID every HUSH node advertises.
pub const SERVICE_UUID: &str = "F47B5E2D-4A9E-4C5A-9B3F-8E1D2C3A4B5C";

/// Characteristic UUID exposing read / write / write-without-response /
/// notify for packet transfer.
pub const CHARACTERISTIC_UUID: &str = "A1B2C3D4-E5F6-4A5B-8C9D-0E1F2A3B4C5D";

/// Manufacturer-data company id carrying the 32-byte combined-public
/// digest, on platforms that allow it.
pub const MANUFACTURER_ID: u16 = 0xFFFF;

/// Errors a driver can report for a write.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The OS refused the radio (permissions, airplane mode).
    #[error("Transport permission denied")]
    PermissionDenied,

    /// The target link is gone.
    #[error("Peer {0} is not connected")]
    NotConnected(PeerId),

    /// Any other driver-level write failure.
    #[error("Transport write failed: {0}")]
    Write(String),
}

/// Events a driver pushes into the engine.
#[derive(Clone, Debug)]
pub enum TransportEvent {
    /// An advertisement was discovered or refreshed. The advertised local
    /// name is the peer id; `digest` is the manufacturer-data key digest
    /// when the platform carries one.
    PeerSeen {
        /// The advertised peer.
        peer: PeerId,
        /// Combined-public digest, when advertised.
        digest: Option<[u8; 32]>,
    },
    /// Bytes arrived from a connected link.
    Bytes {
        /// The source link.
        from: PeerId,
        /// Raw packet bytes.
        bytes: Vec<u8>,
    },
    /// A link dropped.
    PeerLost {
        /// The lost peer.
        peer: PeerId,
    },
}

/// Outbound half of the driver contract.
///
/// Drivers are expected to filter relayed broadcasts away from the link
/// they arrived on; the engine's dedup set makes any echo harmless.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Deliver bytes to one peer, or to every connected neighbor when
    /// `to` is `None`.
    async fn deliver(&self, to: Option<PeerId>, bytes: &[u8]) -> Result<(), TransportError>;
}

/// An in-process transport for tests and demos.
///
/// `deliver` forwards every write to a sink channel tagged with this
/// node's id; a test harness routes the writes to other engines' event
/// channels.
#[derive(Clone, Debug)]
pub struct ChannelTransport {
    local: PeerId,
    sink: mpsc::UnboundedSender<(PeerId, Option<PeerId>, Vec<u8>)>,
}

impl ChannelTransport {
    /// Create a transport writing `(local, to, bytes)` triples to `sink`.
    pub fn new(
        local: PeerId,
        sink: mpsc::UnboundedSender<(PeerId, Option<PeerId>, Vec<u8>)>,
    ) -> Self {
        Self { local, sink }
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn deliver(&self, to: Option<PeerId>, bytes: &[u8]) -> Result<(), TransportError> {
        self.sink
            .send((self.local, to, bytes.to_vec()))
            .map_err(|e| TransportError::Write(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_transport_tags_writes() {
        let local = PeerId::parse("AAAAAAAA").unwrap();
        let remote = PeerId::parse("BBBBBBBB").unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport = ChannelTransport::new(local, tx);

        transport.deliver(Some(remote), b"direct").await.unwrap();
        transport.deliver(None, b"flood").await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), (local, Some(remote), b"direct".to_vec()));
        assert_eq!(rx.recv().await.unwrap(), (local, None, b"flood".to_vec()));
    }

    #[test]
    fn uuids_are_stable() {
        // Drivers hardcode these on the native side.
        assert_eq!(SERVICE_UUID.len(), 36);
        assert_eq!(CHARACTERISTIC_UUID.len(), 36);
        assert_eq!(MANUFACTURER_ID, 0xFFFF);
    }
}
