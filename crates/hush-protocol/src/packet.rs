//! The binary packet codec.
//!
//! Wire layout, all integers big-endian:
//!
//! ```text
//! +---------+------+-----+----------------+-------+-------------+
//! | version | type | ttl | timestamp_ms   | flags | payload_len |
//! |   u8    |  u8  | u8  |      u64       |  u8   |     u16     |
//! +---------+------+-----+----------------+-------+-------------+
//! | sender_id (8) | recipient_id (8, iff HAS_RECIPIENT)         |
//! +--------------------------------------------------------------+
//! | payload (payload_len)  -- 2-byte original length prefix      |
//! |                           + DEFLATE body iff IS_COMPRESSED   |
//! +--------------------------------------------------------------+
//! | signature (64, iff HAS_SIGNATURE)                            |
//! +--------------------------------------------------------------+
//! ```
//!
//! The signature covers the payload section exactly as it appears on the
//! wire: compressed or not, encrypted or not. The decoder computes the
//! full required length from the flags before touching any slice, so
//! hostile input can only produce an error.

use sha2::{Digest, Sha256};

use crate::compression;
use crate::limits::{PROTOCOL_VERSION, TTL_CONTROL, TTL_DATA};
use crate::peer::{PeerId, PEER_ID_SIZE};
use crate::wire::Reader;

/// Bytes before the sender id: version, type, ttl, timestamp, flags, len.
pub const HEADER_SIZE: usize = 14;

/// Smallest possible packet: header plus sender id.
pub const MIN_PACKET_SIZE: usize = HEADER_SIZE + PEER_ID_SIZE;

/// Size of the appended Ed25519 signature.
pub const WIRE_SIGNATURE_SIZE: usize = 64;

const FLAG_HAS_RECIPIENT: u8 = 0x01;
const FLAG_HAS_SIGNATURE: u8 = 0x02;
const FLAG_IS_COMPRESSED: u8 = 0x04;
const RESERVED_FLAGS: u8 = !(FLAG_HAS_RECIPIENT | FLAG_HAS_SIGNATURE | FLAG_IS_COMPRESSED);

/// Packet type registry.
///
/// Unknown values survive decode so forward-compatible relaying works: a
/// node can flood a type it does not understand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// Periodic self-identification carrying the nickname.
    Announce,
    /// 96-byte combined public key bundle for the handshake.
    KeyExchange,
    /// Graceful departure.
    Leave,
    /// A chat message record, broadcast or private.
    Message,
    /// First fragment of an oversized packet.
    FragmentStart,
    /// Middle fragment.
    FragmentCont,
    /// Final fragment.
    FragmentEnd,
    /// Channel membership announcement.
    ChannelAnnounce,
    /// Channel retention policy announcement.
    ChannelRetention,
    /// Delivery acknowledgement for a message id.
    DeliveryAck,
    /// Request for delivery status of a message id.
    DeliveryStatusRequest,
    /// Read receipt for a message id.
    ReadReceipt,
    /// Any type this implementation does not know; relayed, never parsed.
    Unknown(u8),
}

impl PacketType {
    /// Decode from the wire byte.
    pub fn from_wire(raw: u8) -> Self {
        match raw {
            1 => Self::Announce,
            2 => Self::KeyExchange,
            3 => Self::Leave,
            4 => Self::Message,
            5 => Self::FragmentStart,
            6 => Self::FragmentCont,
            7 => Self::FragmentEnd,
            8 => Self::ChannelAnnounce,
            9 => Self::ChannelRetention,
            10 => Self::DeliveryAck,
            11 => Self::DeliveryStatusRequest,
            12 => Self::ReadReceipt,
            other => Self::Unknown(other),
        }
    }

    /// The wire byte.
    pub fn to_wire(self) -> u8 {
        match self {
            Self::Announce => 1,
            Self::KeyExchange => 2,
            Self::Leave => 3,
            Self::Message => 4,
            Self::FragmentStart => 5,
            Self::FragmentCont => 6,
            Self::FragmentEnd => 7,
            Self::ChannelAnnounce => 8,
            Self::ChannelRetention => 9,
            Self::DeliveryAck => 10,
            Self::DeliveryStatusRequest => 11,
            Self::ReadReceipt => 12,
            Self::Unknown(raw) => raw,
        }
    }

    /// The TTL a freshly built packet of this type starts with.
    pub fn initial_ttl(self) -> u8 {
        match self {
            Self::Message | Self::FragmentStart | Self::FragmentCont | Self::FragmentEnd => TTL_DATA,
            _ => TTL_CONTROL,
        }
    }
}

/// Errors from [`Packet::encode`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// The payload section does not fit the u16 length field.
    #[error("Payload of {len} bytes exceeds the u16 wire length")]
    PayloadTooLarge {
        /// Offending payload length.
        len: usize,
    },

    /// The all-0xFF broadcast sentinel is a legacy decode-only form;
    /// broadcasts omit the recipient instead.
    #[error("Refusing to emit the legacy broadcast sentinel recipient")]
    SentinelRecipient,
}

/// Errors from [`Packet::decode`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Fewer bytes than the flags demand.
    #[error("Packet truncated: need {required} bytes, have {actual}")]
    Truncated {
        /// Bytes the header and flags require.
        required: usize,
        /// Bytes actually present.
        actual: usize,
    },

    /// Unsupported protocol version.
    #[error("Unsupported protocol version {0}")]
    BadVersion(u8),

    /// The buffer does not match the length computed from the header.
    #[error("Packet length mismatch: computed {expected}, buffer is {actual}")]
    BadLength {
        /// Length the header computes to.
        expected: usize,
        /// Buffer length.
        actual: usize,
    },

    /// A reserved flag bit was set.
    #[error("Reserved flag bits set: {0:#04x}")]
    ReservedFlag(u8),

    /// The compressed payload failed to expand.
    #[error("Decompression failed: {0}")]
    DecompressFailed(#[from] compression::CompressionError),
}

/// A payload section ready for the wire: the compression decision has
/// been made and, when it paid off, the 2-byte original-length prefix and
/// DEFLATE body are in place.
///
/// Preparation is the expensive half of encoding (an entropy scan plus
/// DEFLATE); engines can run [`prepare_section`] on a worker and finish
/// with [`Packet::encode_with_section`] where the signing key lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedPayload {
    /// The payload section as it will appear on the wire.
    pub section: Vec<u8>,
    /// Whether `section` is the compressed form.
    pub compressed: bool,
    /// Length of the logical payload this was prepared from.
    pub original_len: usize,
}

/// Run the compression policy over a logical payload.
pub fn prepare_section(payload: &[u8]) -> PreparedPayload {
    match compression::compress(payload) {
        Some(deflated) if payload.len() <= u16::MAX as usize => {
            let mut section = Vec::with_capacity(2 + deflated.len());
            section.extend_from_slice(&(payload.len() as u16).to_be_bytes());
            section.extend_from_slice(&deflated);
            PreparedPayload {
                section,
                compressed: true,
                original_len: payload.len(),
            }
        }
        _ => PreparedPayload {
            section: payload.to_vec(),
            compressed: false,
            original_len: payload.len(),
        },
    }
}

/// A packet in logical form: what the engine reads and writes.
///
/// Compression and signatures are wire artifacts; they appear during
/// encode and are reported alongside decode, not stored here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    /// Packet type.
    pub packet_type: PacketType,
    /// Remaining hop budget. Zero means "do not relay".
    pub ttl: u8,
    /// Sender-stamped unix milliseconds.
    pub timestamp_ms: u64,
    /// Originating peer.
    pub sender: PeerId,
    /// Target peer; `None` is a broadcast.
    pub recipient: Option<PeerId>,
    /// Payload in logical (decompressed) form.
    pub payload: Vec<u8>,
}

/// A decoded packet plus the wire artifacts needed for verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundPacket {
    /// The logical packet.
    pub packet: Packet,
    /// The payload section exactly as it appeared on the wire; this is
    /// what the signature covers.
    pub signed_payload: Vec<u8>,
    /// The appended signature, when present.
    pub signature: Option<[u8; WIRE_SIGNATURE_SIZE]>,
    /// Whether the wire form was compressed.
    pub was_compressed: bool,
}

impl Packet {
    /// Build a packet with the type's default initial TTL.
    pub fn new(
        packet_type: PacketType,
        sender: PeerId,
        recipient: Option<PeerId>,
        timestamp_ms: u64,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            packet_type,
            ttl: packet_type.initial_ttl(),
            timestamp_ms,
            sender,
            recipient,
            payload,
        }
    }

    /// Whether this packet addresses every neighbor.
    pub fn is_broadcast(&self) -> bool {
        match &self.recipient {
            None => true,
            Some(r) => r.is_broadcast_sentinel(),
        }
    }

    /// The 64-bit dedup id: a truncated SHA-256 over the sender, the
    /// sender's timestamp, and the logical payload. Identical at every hop
    /// because relaying only rewrites the TTL.
    pub fn dedup_id(&self) -> u64 {
        let mut hasher = Sha256::new();
        hasher.update(self.sender.as_bytes());
        hasher.update(self.timestamp_ms.to_be_bytes());
        hasher.update(&self.payload);
        let digest = hasher.finalize();
        u64::from_be_bytes(digest[..8].try_into().expect("SHA-256 is 32 bytes"))
    }

    /// Encode without a signature (handshake, announce, leave, receipts).
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        self.encode_inner(None::<fn(&[u8]) -> [u8; WIRE_SIGNATURE_SIZE]>)
    }

    /// Encode and append a signature over the final payload section.
    ///
    /// `sign` runs after the compression decision so the signature covers
    /// the bytes that actually hit the wire.
    pub fn encode_signed<F>(&self, sign: F) -> Result<Vec<u8>, EncodeError>
    where
        F: FnOnce(&[u8]) -> [u8; WIRE_SIGNATURE_SIZE],
    {
        self.encode_inner(Some(sign))
    }

    fn encode_inner<F>(&self, sign: Option<F>) -> Result<Vec<u8>, EncodeError>
    where
        F: FnOnce(&[u8]) -> [u8; WIRE_SIGNATURE_SIZE],
    {
        self.encode_with_section(prepare_section(&self.payload), sign)
    }

    /// Finish encoding with an already-prepared payload section.
    ///
    /// The signature, when requested, covers `prepared.section`, exactly
    /// the bytes that hit the wire.
    pub fn encode_with_section<F>(
        &self,
        prepared: PreparedPayload,
        sign: Option<F>,
    ) -> Result<Vec<u8>, EncodeError>
    where
        F: FnOnce(&[u8]) -> [u8; WIRE_SIGNATURE_SIZE],
    {
        debug_assert_eq!(prepared.original_len, self.payload.len());

        if self.recipient.is_some_and(|r| r.is_broadcast_sentinel()) {
            return Err(EncodeError::SentinelRecipient);
        }
        if self.payload.len() > u16::MAX as usize {
            return Err(EncodeError::PayloadTooLarge {
                len: self.payload.len(),
            });
        }
        let PreparedPayload {
            section, compressed, ..
        } = prepared;
        if section.len() > u16::MAX as usize {
            return Err(EncodeError::PayloadTooLarge { len: section.len() });
        }

        let mut flags = 0u8;
        if self.recipient.is_some() {
            flags |= FLAG_HAS_RECIPIENT;
        }
        if sign.is_some() {
            flags |= FLAG_HAS_SIGNATURE;
        }
        if compressed {
            flags |= FLAG_IS_COMPRESSED;
        }

        let capacity = MIN_PACKET_SIZE
            + if self.recipient.is_some() { PEER_ID_SIZE } else { 0 }
            + section.len()
            + if sign.is_some() { WIRE_SIGNATURE_SIZE } else { 0 };
        let mut out = Vec::with_capacity(capacity);

        out.push(PROTOCOL_VERSION);
        out.push(self.packet_type.to_wire());
        out.push(self.ttl);
        out.extend_from_slice(&self.timestamp_ms.to_be_bytes());
        out.push(flags);
        out.extend_from_slice(&(section.len() as u16).to_be_bytes());
        out.extend_from_slice(self.sender.as_bytes());
        if let Some(recipient) = &self.recipient {
            out.extend_from_slice(recipient.as_bytes());
        }
        out.extend_from_slice(&section);
        if let Some(sign) = sign {
            out.extend_from_slice(&sign(&section));
        }

        debug_assert_eq!(out.len(), capacity);
        Ok(out)
    }

    /// Decode a packet from untrusted bytes.
    ///
    /// The required length is computed from the flags before any slicing;
    /// the buffer must match it exactly.
    pub fn decode(bytes: &[u8]) -> Result<InboundPacket, DecodeError> {
        if bytes.len() < MIN_PACKET_SIZE {
            return Err(DecodeError::Truncated {
                required: MIN_PACKET_SIZE,
                actual: bytes.len(),
            });
        }

        let version = bytes[0];
        if version != PROTOCOL_VERSION {
            return Err(DecodeError::BadVersion(version));
        }

        let flags = bytes[11];
        if flags & RESERVED_FLAGS != 0 {
            return Err(DecodeError::ReservedFlag(flags));
        }
        let has_recipient = flags & FLAG_HAS_RECIPIENT != 0;
        let has_signature = flags & FLAG_HAS_SIGNATURE != 0;
        let is_compressed = flags & FLAG_IS_COMPRESSED != 0;

        let payload_len = u16::from_be_bytes([bytes[12], bytes[13]]) as usize;
        let required = MIN_PACKET_SIZE
            + if has_recipient { PEER_ID_SIZE } else { 0 }
            + payload_len
            + if has_signature { WIRE_SIGNATURE_SIZE } else { 0 };
        if bytes.len() < required {
            return Err(DecodeError::Truncated {
                required,
                actual: bytes.len(),
            });
        }
        if bytes.len() > required {
            return Err(DecodeError::BadLength {
                expected: required,
                actual: bytes.len(),
            });
        }

        let mut reader = Reader::new(bytes);
        let _ = reader.take(1); // version
        let packet_type = PacketType::from_wire(reader.u8().expect("length checked"));
        let ttl = reader.u8().expect("length checked");
        let timestamp_ms = reader.u64_be().expect("length checked");
        let _ = reader.take(3); // flags + payload_len

        let sender = PeerId::from_bytes(
            reader
                .take(PEER_ID_SIZE)
                .expect("length checked")
                .try_into()
                .expect("8-byte slice"),
        );
        let recipient = if has_recipient {
            Some(PeerId::from_bytes(
                reader
                    .take(PEER_ID_SIZE)
                    .expect("length checked")
                    .try_into()
                    .expect("8-byte slice"),
            ))
        } else {
            None
        };

        let section = reader.take(payload_len).expect("length checked").to_vec();

        let payload = if is_compressed {
            if section.len() < 2 {
                // No room for the original-length prefix.
                return Err(DecodeError::DecompressFailed(
                    compression::CompressionError::BadStream,
                ));
            }
            let declared = u16::from_be_bytes([section[0], section[1]]) as usize;
            compression::decompress(&section[2..], declared)?
        } else {
            section.clone()
        };

        let signature = if has_signature {
            Some(
                reader
                    .take(WIRE_SIGNATURE_SIZE)
                    .expect("length checked")
                    .try_into()
                    .expect("64-byte slice"),
            )
        } else {
            None
        };

        Ok(InboundPacket {
            packet: Packet {
                packet_type,
                ttl,
                timestamp_ms,
                sender,
                recipient,
                payload,
            },
            signed_payload: section,
            signature,
            was_compressed: is_compressed,
        })
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_packet() -> impl Strategy<Value = Packet> {
        (
            0u8..=20,
            any::<u8>(),
            any::<u64>(),
            proptest::array::uniform8(1u8..=0x7E),
            proptest::option::of(proptest::array::uniform8(1u8..=0xFE)),
            proptest::collection::vec(any::<u8>(), 0..600),
        )
            .prop_map(|(ty, ttl, timestamp_ms, sender, recipient, payload)| Packet {
                packet_type: PacketType::from_wire(ty),
                ttl,
                timestamp_ms,
                sender: PeerId::from_bytes(sender),
                recipient: recipient.map(PeerId::from_bytes),
                payload,
            })
    }

    proptest! {
        #[test]
        fn encode_decode_roundtrip(packet in arb_packet()) {
            let wire = packet.encode().unwrap();
            let decoded = Packet::decode(&wire).unwrap();
            prop_assert_eq!(decoded.packet, packet);
        }

        #[test]
        fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..1024)) {
            let _ = Packet::decode(&bytes);
        }

        #[test]
        fn short_buffers_always_truncated(bytes in proptest::collection::vec(any::<u8>(), 0..13)) {
            let is_truncated = matches!(
                Packet::decode(&bytes),
                Err(DecodeError::Truncated { .. })
            );
            prop_assert!(is_truncated);
        }

        #[test]
        fn accepted_packets_reencode_to_same_length(bytes in proptest::collection::vec(any::<u8>(), 13..256)) {
            // Property: any buffer the decoder accepts has a computed
            // length equal to the buffer length.
            if let Ok(decoded) = Packet::decode(&bytes) {
                let required = MIN_PACKET_SIZE
                    + if decoded.packet.recipient.is_some() { PEER_ID_SIZE } else { 0 }
                    + decoded.signed_payload.len()
                    + if decoded.signature.is_some() { WIRE_SIGNATURE_SIZE } else { 0 };
                prop_assert_eq!(required, bytes.len());
            }
        }
    }
}
