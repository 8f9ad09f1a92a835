//! # hush-protocol
//!
//! Wire formats for the HUSH mesh protocol.
//!
//! This crate is pure data: no I/O, no crypto state, no clocks. It provides:
//!
//! - **Packet codec**: the fixed-header binary wire unit ([`packet`])
//! - **Message record codec**: the bit-packed chat record inside a
//!   MESSAGE payload ([`message`])
//! - **Padding**: length-hiding block padding for private payloads
//!   ([`padding`])
//! - **Compression**: DEFLATE behind an entropy heuristic ([`compression`])
//! - **Fragmentation**: splitting and reassembling packets that exceed the
//!   transport MTU ([`fragment`])
//!
//! Decoders are written for hostile input: every length is validated
//! against the remaining bytes before slicing, and malformed input always
//! surfaces as an error, never a panic.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod compression;
pub mod fragment;
pub mod limits;
pub mod message;
pub mod packet;
pub mod padding;
pub mod peer;

mod wire;

pub use fragment::{FragmentHeader, Reassembler};
pub use message::{MessageRecord, RecordError};
pub use packet::{
    prepare_section, DecodeError, EncodeError, InboundPacket, Packet, PacketType, PreparedPayload,
};
pub use peer::PeerId;
