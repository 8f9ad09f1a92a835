//! The inner message record.
//!
//! A MESSAGE packet's payload is this bit-packed record. Fields appear in
//! a fixed order; a flags byte says which optional fields are present.
//!
//! ```text
//! flags u8 | timestamp_ms u64 | id (u8-len) | sender_nickname (u8-len)
//! | content (u16-len) | original_sender? (u8-len)
//! | recipient_nickname? (u8-len) | sender_peer_id? (u8-len)
//! | mentions? (u8 count, then u8-len each) | channel? (u8-len)
//! ```
//!
//! All strings are UTF-8. `content` is raw bytes because it may be
//! ciphertext when the record travels encrypted.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::wire::Reader;

const FLAG_IS_RELAY: u8 = 0x01;
const FLAG_IS_PRIVATE: u8 = 0x02;
const FLAG_HAS_ORIGINAL_SENDER: u8 = 0x04;
const FLAG_HAS_RECIPIENT_NICKNAME: u8 = 0x08;
const FLAG_HAS_SENDER_PEER_ID: u8 = 0x10;
const FLAG_HAS_MENTIONS: u8 = 0x20;
const FLAG_HAS_CHANNEL: u8 = 0x40;
const FLAG_IS_ENCRYPTED: u8 = 0x80;

/// Errors from the record codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// The byte stream ended before a declared field.
    #[error("Record truncated while reading {field}")]
    Truncated {
        /// The field being read when the stream ran out.
        field: &'static str,
    },

    /// A string field held invalid UTF-8.
    #[error("Record field {field} is not valid UTF-8")]
    BadUtf8 {
        /// The offending field.
        field: &'static str,
    },

    /// Bytes remained after the last declared field.
    #[error("Record has {0} trailing bytes")]
    TrailingBytes(usize),

    /// A field exceeds what its length prefix can carry.
    #[error("Record field {field} of {len} bytes exceeds its {max}-byte limit")]
    FieldTooLong {
        /// The offending field.
        field: &'static str,
        /// Actual byte length.
        len: usize,
        /// Width the prefix allows.
        max: usize,
    },
}

/// A chat message record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Relay marker carried for wire compatibility; the engine neither
    /// sets nor reads it (hop accounting lives in the packet TTL).
    pub is_relay: bool,
    /// Whether this is a direct message rather than a broadcast.
    pub is_private: bool,
    /// Whether `content` is ciphertext.
    pub is_encrypted: bool,
    /// Sender-stamped unix milliseconds.
    pub timestamp_ms: u64,
    /// Message id, unique per sender.
    pub id: String,
    /// Sender's nickname at send time.
    pub sender_nickname: String,
    /// UTF-8 text, or ciphertext when `is_encrypted`.
    pub content: Vec<u8>,
    /// Nickname of the original sender when relayed on their behalf.
    pub original_sender: Option<String>,
    /// Recipient's nickname, for private messages.
    pub recipient_nickname: Option<String>,
    /// Sender's peer id in printable form.
    pub sender_peer_id: Option<String>,
    /// Nicknames mentioned in the content.
    pub mentions: Vec<String>,
    /// Channel name for channel messages.
    pub channel: Option<String>,
}

fn push_u8_prefixed(
    out: &mut Vec<u8>,
    field: &'static str,
    bytes: &[u8],
) -> Result<(), RecordError> {
    if bytes.len() > u8::MAX as usize {
        return Err(RecordError::FieldTooLong {
            field,
            len: bytes.len(),
            max: u8::MAX as usize,
        });
    }
    out.push(bytes.len() as u8);
    out.extend_from_slice(bytes);
    Ok(())
}

fn read_string<'a>(reader: &mut Reader<'a>, field: &'static str) -> Result<&'a str, RecordError> {
    let bytes = reader
        .prefixed_u8()
        .ok_or(RecordError::Truncated { field })?;
    std::str::from_utf8(bytes).map_err(|_| RecordError::BadUtf8 { field })
}

impl MessageRecord {
    /// Serialize to the wire form.
    pub fn encode(&self) -> Result<Vec<u8>, RecordError> {
        let mut flags = 0u8;
        if self.is_relay {
            flags |= FLAG_IS_RELAY;
        }
        if self.is_private {
            flags |= FLAG_IS_PRIVATE;
        }
        if self.original_sender.is_some() {
            flags |= FLAG_HAS_ORIGINAL_SENDER;
        }
        if self.recipient_nickname.is_some() {
            flags |= FLAG_HAS_RECIPIENT_NICKNAME;
        }
        if self.sender_peer_id.is_some() {
            flags |= FLAG_HAS_SENDER_PEER_ID;
        }
        if !self.mentions.is_empty() {
            flags |= FLAG_HAS_MENTIONS;
        }
        if self.channel.is_some() {
            flags |= FLAG_HAS_CHANNEL;
        }
        if self.is_encrypted {
            flags |= FLAG_IS_ENCRYPTED;
        }

        let mut out = Vec::with_capacity(32 + self.content.len());
        out.push(flags);
        out.extend_from_slice(&self.timestamp_ms.to_be_bytes());
        push_u8_prefixed(&mut out, "id", self.id.as_bytes())?;
        push_u8_prefixed(&mut out, "sender_nickname", self.sender_nickname.as_bytes())?;

        if self.content.len() > u16::MAX as usize {
            return Err(RecordError::FieldTooLong {
                field: "content",
                len: self.content.len(),
                max: u16::MAX as usize,
            });
        }
        out.extend_from_slice(&(self.content.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.content);

        if let Some(original_sender) = &self.original_sender {
            push_u8_prefixed(&mut out, "original_sender", original_sender.as_bytes())?;
        }
        if let Some(recipient_nickname) = &self.recipient_nickname {
            push_u8_prefixed(&mut out, "recipient_nickname", recipient_nickname.as_bytes())?;
        }
        if let Some(sender_peer_id) = &self.sender_peer_id {
            push_u8_prefixed(&mut out, "sender_peer_id", sender_peer_id.as_bytes())?;
        }
        if !self.mentions.is_empty() {
            if self.mentions.len() > u8::MAX as usize {
                return Err(RecordError::FieldTooLong {
                    field: "mentions",
                    len: self.mentions.len(),
                    max: u8::MAX as usize,
                });
            }
            out.push(self.mentions.len() as u8);
            for mention in &self.mentions {
                push_u8_prefixed(&mut out, "mention", mention.as_bytes())?;
            }
        }
        if let Some(channel) = &self.channel {
            push_u8_prefixed(&mut out, "channel", channel.as_bytes())?;
        }

        Ok(out)
    }

    /// Parse a record from untrusted bytes.
    ///
    /// Every declared length is validated against the remaining bytes; an
    /// under-run fails and drops the enclosing packet upstream.
    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        let mut reader = Reader::new(bytes);

        let flags = reader.u8().ok_or(RecordError::Truncated { field: "flags" })?;
        let timestamp_ms = reader
            .u64_be()
            .ok_or(RecordError::Truncated { field: "timestamp" })?;

        let id = read_string(&mut reader, "id")?.to_string();
        let sender_nickname = read_string(&mut reader, "sender_nickname")?.to_string();
        let content = reader
            .prefixed_u16()
            .ok_or(RecordError::Truncated { field: "content" })?
            .to_vec();

        let original_sender = if flags & FLAG_HAS_ORIGINAL_SENDER != 0 {
            Some(read_string(&mut reader, "original_sender")?.to_string())
        } else {
            None
        };
        let recipient_nickname = if flags & FLAG_HAS_RECIPIENT_NICKNAME != 0 {
            Some(read_string(&mut reader, "recipient_nickname")?.to_string())
        } else {
            None
        };
        let sender_peer_id = if flags & FLAG_HAS_SENDER_PEER_ID != 0 {
            Some(read_string(&mut reader, "sender_peer_id")?.to_string())
        } else {
            None
        };

        let mut mentions = Vec::new();
        if flags & FLAG_HAS_MENTIONS != 0 {
            let count = reader
                .u8()
                .ok_or(RecordError::Truncated { field: "mentions" })?;
            for _ in 0..count {
                mentions.push(read_string(&mut reader, "mention")?.to_string());
            }
        }

        let channel = if flags & FLAG_HAS_CHANNEL != 0 {
            Some(read_string(&mut reader, "channel")?.to_string())
        } else {
            None
        };

        if reader.remaining() > 0 {
            return Err(RecordError::TrailingBytes(reader.remaining()));
        }

        Ok(Self {
            is_relay: flags & FLAG_IS_RELAY != 0,
            is_private: flags & FLAG_IS_PRIVATE != 0,
            is_encrypted: flags & FLAG_IS_ENCRYPTED != 0,
            timestamp_ms,
            id,
            sender_nickname,
            content,
            original_sender,
            recipient_nickname,
            sender_peer_id,
            mentions,
            channel,
        })
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn arb_record() -> impl Strategy<Value = MessageRecord> {
        let short = || proptest::string::string_regex("[a-zA-Z0-9 #@_-]{0,40}").unwrap();
        (
            (any::<bool>(), any::<bool>(), any::<bool>()),
            any::<u64>(),
            short(),
            short(),
            proptest::collection::vec(any::<u8>(), 0..300),
            proptest::option::of(short()),
            proptest::option::of(short()),
            proptest::option::of(short()),
            proptest::collection::vec(short(), 0..4),
            proptest::option::of(short()),
        )
            .prop_map(
                |(
                    (is_relay, is_private, is_encrypted),
                    timestamp_ms,
                    id,
                    sender_nickname,
                    content,
                    original_sender,
                    recipient_nickname,
                    sender_peer_id,
                    mentions,
                    channel,
                )| MessageRecord {
                    is_relay,
                    is_private,
                    is_encrypted,
                    timestamp_ms,
                    id,
                    sender_nickname,
                    content,
                    original_sender,
                    recipient_nickname,
                    sender_peer_id,
                    mentions,
                    channel,
                },
            )
    }

    proptest! {
        #[test]
        fn encode_decode_roundtrip(record in arb_record()) {
            let wire = record.encode().unwrap();
            prop_assert_eq!(MessageRecord::decode(&wire).unwrap(), record);
        }

        #[test]
        fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let _ = MessageRecord::decode(&bytes);
        }
    }
}
