//! Fragmentation of packets that exceed the transport MTU.
//!
//! An oversized encoded packet is split into FRAGMENT_START / CONT / END
//! packets. Each fragment payload carries a common 8-byte fragment id, its
//! index, the total count, and a slice of the original bytes:
//!
//! ```text
//! fragment_id (8) | index u16 BE | total u16 BE | data
//! ```
//!
//! The receiver reassembles per `(sender, fragment_id)` and feeds the
//! concatenation back through the inbound pipeline as a fresh packet.
//! Incomplete sets expire; per-peer buffer memory is capped.

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;

use crate::limits::{FRAGMENT_TIMEOUT, REASSEMBLY_CAP_BYTES};
use crate::packet::PacketType;
use crate::peer::PeerId;
use crate::wire::Reader;

/// Size of a fragment id.
pub const FRAGMENT_ID_SIZE: usize = 8;

/// Fixed bytes before the data slice in a fragment payload.
pub const FRAGMENT_HEADER_SIZE: usize = FRAGMENT_ID_SIZE + 2 + 2;

/// Errors from fragment parsing and reassembly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FragmentError {
    /// The fragment payload is shorter than its fixed header.
    #[error("Fragment payload truncated")]
    Truncated,

    /// index >= total, or total is zero.
    #[error("Fragment index {index} out of range for total {total}")]
    IndexOutOfRange {
        /// Claimed index.
        index: u16,
        /// Claimed total.
        total: u16,
    },

    /// A fragment disagreed with the set it joined about the total count.
    #[error("Fragment total changed mid-set: {previous} then {claimed}")]
    TotalMismatch {
        /// Total recorded when the set was opened.
        previous: u16,
        /// Total this fragment claims.
        claimed: u16,
    },

    /// Accepting the fragment would exceed the peer's buffer cap.
    #[error("Reassembly buffer for peer exceeds {REASSEMBLY_CAP_BYTES} bytes")]
    BufferExceeded,
}

/// Parsed fragment payload header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FragmentHeader {
    /// Identifier shared by all fragments of one packet.
    pub fragment_id: [u8; FRAGMENT_ID_SIZE],
    /// Zero-based index of this fragment.
    pub index: u16,
    /// Total number of fragments in the set.
    pub total: u16,
}

impl FragmentHeader {
    /// Split a fragment payload into its header and data slice.
    pub fn parse(payload: &[u8]) -> Result<(Self, &[u8]), FragmentError> {
        let mut reader = Reader::new(payload);
        let fragment_id: [u8; FRAGMENT_ID_SIZE] = reader
            .take(FRAGMENT_ID_SIZE)
            .ok_or(FragmentError::Truncated)?
            .try_into()
            .expect("8-byte slice");
        let index = reader.u16_be().ok_or(FragmentError::Truncated)?;
        let total = reader.u16_be().ok_or(FragmentError::Truncated)?;
        if total == 0 || index >= total {
            return Err(FragmentError::IndexOutOfRange { index, total });
        }
        let data = &payload[FRAGMENT_HEADER_SIZE..];
        Ok((Self { fragment_id, index, total }, data))
    }

    /// The packet type carrying a fragment at `index` of `total`.
    pub fn packet_type_for(index: u16, total: u16) -> PacketType {
        if index == 0 {
            PacketType::FragmentStart
        } else if index + 1 == total {
            PacketType::FragmentEnd
        } else {
            PacketType::FragmentCont
        }
    }
}

/// Split `bytes` into fragment payloads of at most `max_data` data bytes.
///
/// Returns `(packet_type, fragment_payload)` pairs in transmit order.
/// Callers only fragment when the encoded packet exceeds the MTU, so the
/// result always has at least two fragments.
pub fn split(
    bytes: &[u8],
    max_data: usize,
    fragment_id: [u8; FRAGMENT_ID_SIZE],
) -> Vec<(PacketType, Vec<u8>)> {
    assert!(max_data > 0, "fragment data budget must be positive");
    assert!(bytes.len() >= 2, "nothing to fragment");

    let total = bytes.len().div_ceil(max_data).max(2) as u16;
    let chunk = bytes.len().div_ceil(total as usize);

    bytes
        .chunks(chunk.max(1))
        .enumerate()
        .map(|(i, data)| {
            let index = i as u16;
            let mut payload = Vec::with_capacity(FRAGMENT_HEADER_SIZE + data.len());
            payload.extend_from_slice(&fragment_id);
            payload.extend_from_slice(&index.to_be_bytes());
            payload.extend_from_slice(&total.to_be_bytes());
            payload.extend_from_slice(data);
            (FragmentHeader::packet_type_for(index, total), payload)
        })
        .collect()
}

/// A partially reassembled fragment set.
#[derive(Debug)]
struct PendingSet {
    total: u16,
    chunks: HashMap<u16, Vec<u8>>,
    first_seen_ms: u64,
    buffered: usize,
}

impl PendingSet {
    fn is_complete(&self) -> bool {
        self.chunks.len() == self.total as usize
    }

    fn assemble(mut self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.buffered);
        for index in 0..self.total {
            out.extend_from_slice(&self.chunks.remove(&index).expect("complete set"));
        }
        out
    }
}

/// Reassembles fragment sets per `(sender, fragment_id)`.
#[derive(Debug)]
pub struct Reassembler {
    pending: HashMap<(PeerId, [u8; FRAGMENT_ID_SIZE]), PendingSet>,
    timeout: Duration,
    per_peer_cap: usize,
}

impl Reassembler {
    /// Create a reassembler with the protocol's default timeout and cap.
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
            timeout: FRAGMENT_TIMEOUT,
            per_peer_cap: REASSEMBLY_CAP_BYTES,
        }
    }

    /// Accept one fragment payload from `sender`.
    ///
    /// Returns `Ok(Some(bytes))` with the reassembled original once the
    /// set is complete, `Ok(None)` while fragments are still missing.
    pub fn accept(
        &mut self,
        sender: PeerId,
        payload: &[u8],
        now_ms: u64,
    ) -> Result<Option<Vec<u8>>, FragmentError> {
        let (header, data) = FragmentHeader::parse(payload)?;
        let key = (sender, header.fragment_id);

        let peer_buffered: usize = self
            .pending
            .iter()
            .filter(|((peer, _), _)| *peer == sender)
            .map(|(_, set)| set.buffered)
            .sum();
        if peer_buffered + data.len() > self.per_peer_cap {
            return Err(FragmentError::BufferExceeded);
        }

        let set = self.pending.entry(key).or_insert_with(|| PendingSet {
            total: header.total,
            chunks: HashMap::new(),
            first_seen_ms: now_ms,
            buffered: 0,
        });
        if set.total != header.total {
            return Err(FragmentError::TotalMismatch {
                previous: set.total,
                claimed: header.total,
            });
        }

        // Duplicate indices are ignored, same as duplicate packets.
        if !set.chunks.contains_key(&header.index) {
            set.buffered += data.len();
            set.chunks.insert(header.index, data.to_vec());
        }

        if set.is_complete() {
            let set = self.pending.remove(&key).expect("just inserted");
            return Ok(Some(set.assemble()));
        }
        Ok(None)
    }

    /// Drop incomplete sets older than the timeout. Returns how many.
    pub fn sweep(&mut self, now_ms: u64) -> usize {
        let timeout_ms = self.timeout.as_millis() as u64;
        let before = self.pending.len();
        self.pending
            .retain(|_, set| now_ms.saturating_sub(set.first_seen_ms) <= timeout_ms);
        before - self.pending.len()
    }

    /// Number of incomplete sets currently buffered.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop all state (session stop).
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}
