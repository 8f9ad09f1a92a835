//! Engine inputs and upstream events.
//!
//! Every stimulus the engine reacts to is one [`MeshEvent`] variant; the
//! coordinator is the only dispatcher. Deliveries and notifications flow
//! back out as [`NodeEvent`]s.

use hush_protocol::{PeerId, PreparedPayload, RecordError};

use crate::error::MeshError;

/// A stimulus for the mesh state machine.
#[derive(Debug)]
pub enum MeshEvent {
    /// Raw bytes surfaced by the transport from a connected link.
    IncomingBytes {
        /// The link the bytes arrived on.
        from: PeerId,
        /// The raw packet bytes.
        bytes: Vec<u8>,
    },
    /// A peer advertisement was discovered or refreshed.
    PeerSeen {
        /// The advertised peer id.
        peer: PeerId,
        /// Combined-public digest from manufacturer data, when present.
        digest: Option<[u8; 32]>,
    },
    /// A link dropped.
    PeerLost {
        /// The lost peer.
        peer: PeerId,
    },
    /// A periodic timer fired.
    Timer(TimerKind),
    /// An application send request.
    Send(SendRequest),
    /// A worker finished an offloaded payload preparation job.
    CryptoDone {
        /// Job id handed out when the work was offloaded.
        job_id: u64,
        /// The prepared wire payload section, or the failure to report.
        result: Result<PreparedPayload, MeshError>,
    },
}

/// The engine's periodic timers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerKind {
    /// Broadcast our ANNOUNCE (every 30 s, and once at start).
    Announce,
    /// Garbage collection: peers, dedup ids, fragments, stored messages.
    Gc,
}

/// Application-level send requests routed through the coordinator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendRequest {
    /// Broadcast plaintext to every neighbor.
    Broadcast {
        /// Message text.
        content: String,
    },
    /// Encrypt for one peer.
    Private {
        /// Recipient.
        to: PeerId,
        /// Message text.
        content: String,
    },
    /// Broadcast into a named channel.
    Channel {
        /// Channel name.
        name: String,
        /// Message text.
        content: String,
    },
    /// Join a channel and announce the membership.
    JoinChannel {
        /// Channel name.
        name: String,
    },
    /// Leave a channel and announce the departure.
    LeaveChannel {
        /// Channel name.
        name: String,
    },
    /// Mark or unmark a peer as favorite (store-and-forward class).
    SetFavorite {
        /// The peer.
        peer: PeerId,
        /// New favorite state.
        favorite: bool,
    },
}

/// A chat message delivered to the application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    /// Message id, unique per sender.
    pub id: String,
    /// Originating peer.
    pub sender: PeerId,
    /// Sender's nickname at send time.
    pub sender_nickname: String,
    /// Decrypted UTF-8 text.
    pub content: String,
    /// Channel name, when a channel message.
    pub channel: Option<String>,
    /// Mentioned nicknames.
    pub mentions: Vec<String>,
    /// Sender-stamped unix milliseconds.
    pub timestamp_ms: u64,
    /// Whether the message was end-to-end encrypted for us.
    pub is_private: bool,
}

/// Events the engine surfaces to the application.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeEvent {
    /// A chat message arrived.
    Message(ChatMessage),
    /// A peer was seen for the first time this session.
    PeerDiscovered {
        /// The new peer.
        peer: PeerId,
    },
    /// A peer's nickname or liveness changed.
    PeerUpdated {
        /// The peer.
        peer: PeerId,
        /// Current nickname, when known.
        nickname: Option<String>,
        /// Whether the peer is currently online.
        online: bool,
    },
    /// A peer completed its first ANNOUNCE this session.
    PeerConnected {
        /// The peer.
        peer: PeerId,
        /// The announced nickname.
        nickname: String,
    },
    /// A peer left or its link dropped.
    PeerDisconnected {
        /// The peer.
        peer: PeerId,
    },
    /// A peer announced channel membership.
    ChannelAnnounce {
        /// The announcing peer.
        peer: PeerId,
        /// The channel.
        channel: String,
        /// True on join, false on leave.
        joined: bool,
    },
    /// A peer announced a channel retention policy.
    ChannelRetention {
        /// The announcing peer.
        peer: PeerId,
        /// The channel.
        channel: String,
        /// Whether retention is enabled.
        enabled: bool,
    },
    /// A delivery acknowledgement addressed to us.
    DeliveryAck {
        /// The acknowledging peer.
        peer: PeerId,
        /// The acknowledged message id.
        message_id: String,
    },
    /// A delivery status request addressed to us.
    DeliveryStatusRequest {
        /// The requesting peer.
        peer: PeerId,
        /// The queried message id.
        message_id: String,
    },
    /// A read receipt addressed to us.
    ReadReceipt {
        /// The reading peer.
        peer: PeerId,
        /// The read message id.
        message_id: String,
    },
    /// A log line for surfaces without tracing subscribers.
    Log {
        /// The line.
        line: String,
    },
}

/// Why an inbound packet was dropped; feeds log events only.
#[derive(Debug)]
pub(crate) enum DropReason {
    Duplicate,
    Decode(String),
    ImplausibleTimestamp(u64),
    BadRecord(RecordError),
    SignatureMissing,
    SignatureInvalid,
    DecryptionFailed,
    NotJoinedChannel(String),
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Duplicate => write!(f, "duplicate packet"),
            Self::Decode(e) => write!(f, "undecodable packet: {e}"),
            Self::ImplausibleTimestamp(ts) => write!(f, "implausible timestamp {ts}"),
            Self::BadRecord(e) => write!(f, "malformed message record: {e}"),
            Self::SignatureMissing => write!(f, "private message without signature"),
            Self::SignatureInvalid => write!(f, "signature verification failed"),
            Self::DecryptionFailed => write!(f, "decryption failed"),
            Self::NotJoinedChannel(c) => write!(f, "message for unjoined channel {c}"),
        }
    }
}
