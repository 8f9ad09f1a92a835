//! The mesh state machine.
//!
//! Pure logic, zero async, zero I/O. Every `handle_*` / `tick_*` method
//! takes the current time and returns the effects the coordinator must
//! execute. All mutable protocol state lives here, so processing order on
//! the coordinator is the only synchronization the engine needs.

use std::collections::{BTreeMap, HashSet};

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, trace, warn};

use hush_crypto::SessionIdentity;
use hush_protocol::fragment::{self, FRAGMENT_HEADER_SIZE};
use hush_protocol::limits::DEFAULT_MTU;
use hush_protocol::packet::{prepare_section, PreparedPayload, MIN_PACKET_SIZE};
use hush_protocol::padding::{optimal_block_size, pad, unpad};
use hush_protocol::{
    InboundPacket, MessageRecord, Packet, PacketType, PeerId, Reassembler,
};

use crate::dedup::DedupSet;
use crate::effect::Effect;
use crate::error::MeshError;
use crate::event::{ChatMessage, DropReason, MeshEvent, NodeEvent, SendRequest, TimerKind};
use crate::keystore::KeyStore;
use crate::peers::PeerTable;
use crate::store_forward::{MessageStore, RetentionClass, StoredMessage};
use crate::time::plausible_timestamp;

/// Engine tunables.
#[derive(Clone, Copy, Debug)]
pub struct MeshConfig {
    /// MTU budget per transport write; larger packets fragment.
    pub mtu: usize,
    /// Payloads at or above this size are prepared on a blocking worker.
    pub offload_threshold: usize,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            mtu: DEFAULT_MTU,
            offload_threshold: 4 * 1024,
        }
    }
}

/// An outbound packet waiting for its prepared payload section.
struct PendingSend {
    packet: Packet,
    sign: bool,
    ready: Option<Result<PreparedPayload, MeshError>>,
}

/// The complete protocol state of one node.
pub struct MeshState {
    me: PeerId,
    nickname: String,
    config: MeshConfig,

    keystore: KeyStore,
    peers: PeerTable,
    dedup: DedupSet,
    store: MessageStore,
    fragments: Reassembler,

    /// Channels we are a member of; delivery of channel messages is gated
    /// on membership, relaying is not.
    channels: HashSet<String>,
    /// Peers whose first ANNOUNCE this session already produced a
    /// connected event.
    announced: HashSet<PeerId>,
    /// One-shot reply guard per `(sender, exchange id)`.
    replied_exchanges: HashSet<(PeerId, [u8; 16])>,

    /// Outbound packets in submission order; released strictly in order
    /// so signatures and nonces never race a later send.
    outbox: BTreeMap<u64, PendingSend>,
    next_job_id: u64,
}

impl MeshState {
    /// Build the state machine for a session.
    pub fn new(me: PeerId, nickname: String, identity: SessionIdentity, config: MeshConfig) -> Self {
        Self {
            me,
            nickname,
            config,
            keystore: KeyStore::new(identity),
            peers: PeerTable::new(),
            dedup: DedupSet::new(),
            store: MessageStore::new(),
            fragments: Reassembler::new(),
            channels: HashSet::new(),
            announced: HashSet::new(),
            replied_exchanges: HashSet::new(),
            outbox: BTreeMap::new(),
            next_job_id: 0,
        }
    }

    /// Our own peer id.
    pub fn local_id(&self) -> PeerId {
        self.me
    }

    /// The peer table (read-only).
    pub fn peer_table(&self) -> &PeerTable {
        &self.peers
    }

    /// Whether the handshake with `peer` completed.
    pub fn has_session(&self, peer: &PeerId) -> bool {
        self.keystore.has_session(peer)
    }

    /// Channels this node currently belongs to.
    pub fn joined_channels(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(String::as_str)
    }

    /// The store-and-forward buffer (read-only).
    pub fn message_store(&self) -> &MessageStore {
        &self.store
    }

    /// Our combined-public digest, for drivers that advertise it.
    pub fn public_digest(&self) -> [u8; 32] {
        self.keystore.public_digest()
    }

    /// Number of packet ids currently in the dedup set.
    pub fn dedup_len(&self) -> usize {
        self.dedup.len()
    }

    /// Number of incomplete fragment sets currently buffered.
    pub fn pending_fragments(&self) -> usize {
        self.fragments.pending_count()
    }

    /// The single event dispatcher.
    pub fn handle_event(&mut self, event: MeshEvent, now_ms: u64) -> Vec<Effect> {
        match event {
            MeshEvent::IncomingBytes { from, bytes } => self.handle_incoming(from, &bytes, now_ms),
            MeshEvent::PeerSeen { peer, digest } => self.handle_peer_seen(peer, digest, now_ms),
            MeshEvent::PeerLost { peer } => self.handle_peer_lost(peer),
            MeshEvent::Timer(TimerKind::Announce) => self.tick_announce(now_ms),
            MeshEvent::Timer(TimerKind::Gc) => self.tick_gc(now_ms),
            MeshEvent::Send(request) => self.handle_send(request, now_ms).0,
            MeshEvent::CryptoDone { job_id, result } => {
                self.handle_crypto_done(job_id, result, now_ms)
            }
        }
    }

    // ── Discovery ───────────────────────────────────────────────────────

    /// An advertisement was seen. Refresh the peer and, when no session
    /// key exists yet, start the handshake.
    pub fn handle_peer_seen(
        &mut self,
        peer: PeerId,
        digest: Option<[u8; 32]>,
        now_ms: u64,
    ) -> Vec<Effect> {
        if peer == self.me {
            return Vec::new();
        }

        let mut effects = Vec::new();
        if self.peers.record_sighting(peer, now_ms) {
            effects.push(Effect::Emit(NodeEvent::PeerDiscovered { peer }));
        }
        if let Some(digest) = digest {
            self.peers.record_digest(&peer, digest);
        }

        if !self.keystore.has_session(&peer) {
            effects.extend(self.send_key_exchange(peer, now_ms));
        }
        effects
    }

    /// A link dropped.
    pub fn handle_peer_lost(&mut self, peer: PeerId) -> Vec<Effect> {
        self.peers.mark_offline(&peer);
        self.announced.remove(&peer);
        vec![Effect::Emit(NodeEvent::PeerDisconnected { peer })]
    }

    // ── Timers ──────────────────────────────────────────────────────────

    /// Broadcast our ANNOUNCE.
    pub fn tick_announce(&mut self, now_ms: u64) -> Vec<Effect> {
        let packet = Packet::new(
            PacketType::Announce,
            self.me,
            None,
            now_ms,
            self.nickname.clone().into_bytes(),
        );
        self.submit(packet, true, now_ms)
    }

    /// Garbage collection sweep.
    pub fn tick_gc(&mut self, now_ms: u64) -> Vec<Effect> {
        let mut effects = Vec::new();

        for peer in self.peers.evict_stale(now_ms) {
            self.announced.remove(&peer);
            debug!(%peer, "peer evicted after silence");
            effects.push(Effect::Emit(NodeEvent::PeerDisconnected { peer }));
        }

        let dedup_swept = self.dedup.sweep(now_ms);
        let fragments_swept = self.fragments.sweep(now_ms);
        let stored_expired = self.store.purge_expired(now_ms);
        if dedup_swept + fragments_swept + stored_expired > 0 {
            debug!(dedup_swept, fragments_swept, stored_expired, "gc sweep");
        }
        effects
    }

    // ── Sends ───────────────────────────────────────────────────────────

    /// Apply an application send request.
    ///
    /// Returns the effects to execute plus the caller-facing outcome.
    pub fn handle_send(
        &mut self,
        request: SendRequest,
        now_ms: u64,
    ) -> (Vec<Effect>, Result<(), MeshError>) {
        match request {
            SendRequest::Broadcast { content } => self.send_message(None, content, now_ms),
            SendRequest::Channel { name, content } => {
                self.send_message(Some(name), content, now_ms)
            }
            SendRequest::Private { to, content } => self.send_private(to, content, now_ms),
            SendRequest::JoinChannel { name } => {
                self.channels.insert(name.clone());
                let effects = self.send_channel_announce(&name, true, now_ms);
                (effects, Ok(()))
            }
            SendRequest::LeaveChannel { name } => {
                self.channels.remove(&name);
                let effects = self.send_channel_announce(&name, false, now_ms);
                (effects, Ok(()))
            }
            SendRequest::SetFavorite { peer, favorite } => {
                self.peers.set_favorite(peer, favorite);
                (Vec::new(), Ok(()))
            }
        }
    }

    /// Park a message for an absent peer; the class follows the peer's
    /// favorite flag. Drains on the peer's next ANNOUNCE.
    pub fn park(&mut self, peer: PeerId, message: StoredMessage) {
        let class = if self.peers.is_favorite(&peer) {
            RetentionClass::Favorite
        } else {
            RetentionClass::Regular
        };
        self.store.enqueue(peer, message, class);
    }

    /// Broadcast our LEAVE (session stop).
    pub fn leave(&mut self, now_ms: u64) -> Vec<Effect> {
        let packet = Packet::new(PacketType::Leave, self.me, None, now_ms, Vec::new());
        self.submit(packet, true, now_ms)
    }

    /// Wipe all session state.
    pub fn clear(&mut self) {
        self.keystore.clear();
        self.peers.clear();
        self.dedup.clear();
        self.store.clear();
        self.fragments.clear();
        self.channels.clear();
        self.announced.clear();
        self.replied_exchanges.clear();
        self.outbox.clear();
    }

    fn send_message(
        &mut self,
        channel: Option<String>,
        content: String,
        now_ms: u64,
    ) -> (Vec<Effect>, Result<(), MeshError>) {
        let record = MessageRecord {
            timestamp_ms: now_ms,
            id: random_message_id(),
            sender_nickname: self.nickname.clone(),
            sender_peer_id: Some(self.me.display()),
            mentions: extract_mentions(&content),
            channel,
            content: content.into_bytes(),
            ..Default::default()
        };
        let payload = match record.encode() {
            Ok(payload) => payload,
            Err(e) => return (Vec::new(), Err(MeshError::EncodingFailed(e.to_string()))),
        };

        let packet = Packet::new(PacketType::Message, self.me, None, now_ms, payload);
        (self.submit(packet, true, now_ms), Ok(()))
    }

    fn send_private(
        &mut self,
        to: PeerId,
        content: String,
        now_ms: u64,
    ) -> (Vec<Effect>, Result<(), MeshError>) {
        if !self.keystore.has_session(&to) {
            // Start the handshake so a retry can succeed; this send fails.
            let effects = self.send_key_exchange(to, now_ms);
            return (effects, Err(MeshError::NoSharedSecret(to)));
        }

        let record = MessageRecord {
            is_private: true,
            timestamp_ms: now_ms,
            id: random_message_id(),
            sender_nickname: self.nickname.clone(),
            sender_peer_id: Some(self.me.display()),
            recipient_nickname: Some(self.peers.display_name(&to)),
            mentions: extract_mentions(&content),
            content: content.into_bytes(),
            ..Default::default()
        };
        let serialized = match record.encode() {
            Ok(bytes) => bytes,
            Err(e) => return (Vec::new(), Err(MeshError::EncodingFailed(e.to_string()))),
        };

        let padded = pad(&serialized, optimal_block_size(serialized.len()));
        let sealed = match self.keystore.encrypt_for(&to, &padded) {
            Ok(sealed) => sealed,
            Err(e) => return (Vec::new(), Err(e)),
        };

        let packet = Packet::new(PacketType::Message, self.me, Some(to), now_ms, sealed);
        (self.submit(packet, true, now_ms), Ok(()))
    }

    fn send_key_exchange(&mut self, to: PeerId, now_ms: u64) -> Vec<Effect> {
        let packet = Packet::new(
            PacketType::KeyExchange,
            self.me,
            Some(to),
            now_ms,
            self.keystore.combined_public().to_vec(),
        );
        debug!(peer = %to, "initiating key exchange");
        self.submit(packet, false, now_ms)
    }

    fn send_channel_announce(&mut self, name: &str, joined: bool, now_ms: u64) -> Vec<Effect> {
        let name_bytes = name.as_bytes();
        let mut payload = Vec::with_capacity(2 + name_bytes.len());
        payload.push(name_bytes.len().min(u8::MAX as usize) as u8);
        payload.extend_from_slice(&name_bytes[..name_bytes.len().min(u8::MAX as usize)]);
        payload.push(u8::from(joined));

        let packet = Packet::new(PacketType::ChannelAnnounce, self.me, None, now_ms, payload);
        self.submit(packet, true, now_ms)
    }

    // ── The ordered outbox ──────────────────────────────────────────────

    fn submit(&mut self, packet: Packet, sign: bool, now_ms: u64) -> Vec<Effect> {
        let job_id = self.next_job_id;
        self.next_job_id += 1;

        let mut effects = Vec::new();
        let ready = if packet.payload.len() >= self.config.offload_threshold {
            effects.push(Effect::PrepareAsync {
                job_id,
                payload: packet.payload.clone(),
            });
            None
        } else {
            Some(Ok(prepare_section(&packet.payload)))
        };

        self.outbox.insert(job_id, PendingSend { packet, sign, ready });
        effects.extend(self.flush_outbox(now_ms));
        effects
    }

    /// A prepared payload section came back from the worker.
    pub fn handle_crypto_done(
        &mut self,
        job_id: u64,
        result: Result<PreparedPayload, MeshError>,
        now_ms: u64,
    ) -> Vec<Effect> {
        match self.outbox.get_mut(&job_id) {
            Some(job) => job.ready = Some(result),
            None => warn!(job_id, "completion for unknown job"),
        }
        self.flush_outbox(now_ms)
    }

    /// Release ready jobs strictly in submission order.
    fn flush_outbox(&mut self, now_ms: u64) -> Vec<Effect> {
        let mut effects = Vec::new();
        loop {
            let Some(entry) = self.outbox.first_entry() else {
                break;
            };
            if entry.get().ready.is_none() {
                break;
            }
            let (job_id, job) = entry.remove_entry();
            match job.ready.expect("checked above") {
                Ok(prepared) => {
                    effects.extend(self.finalize_send(job.packet, job.sign, prepared, now_ms));
                }
                Err(e) => {
                    warn!(job_id, error = %e, "payload preparation failed; dropping send");
                    effects.push(Effect::Emit(NodeEvent::Log {
                        line: format!("outbound send dropped: {e}"),
                    }));
                }
            }
        }
        effects
    }

    fn finalize_send(
        &mut self,
        packet: Packet,
        sign: bool,
        prepared: PreparedPayload,
        now_ms: u64,
    ) -> Vec<Effect> {
        let keystore = &self.keystore;
        let encoded = if sign {
            packet.encode_with_section(prepared, Some(|section: &[u8]| keystore.sign(section)))
        } else {
            packet.encode_with_section(prepared, None::<fn(&[u8]) -> [u8; 64]>)
        };
        let wire = match encoded {
            Ok(wire) => wire,
            Err(e) => {
                warn!(error = %e, "packet encoding failed; dropping send");
                return vec![Effect::Emit(NodeEvent::Log {
                    line: format!("outbound send dropped: {e}"),
                })];
            }
        };

        // We will hear our own packets echoed back by neighbors.
        self.dedup.admit(packet.dedup_id(), now_ms);

        let route = match packet.packet_type {
            // Handshakes go to a direct neighbor; everything else floods.
            PacketType::KeyExchange => packet.recipient,
            _ => None,
        };

        if wire.len() <= self.config.mtu {
            return vec![Effect::Transmit { to: route, bytes: wire }];
        }

        // Fragment: each fragment must itself fit the MTU.
        let max_data = self
            .config
            .mtu
            .saturating_sub(MIN_PACKET_SIZE + 8 + FRAGMENT_HEADER_SIZE)
            .max(1);
        let mut fragment_id = [0u8; 8];
        OsRng.fill_bytes(&mut fragment_id);

        let mut effects = Vec::new();
        for (packet_type, fragment_payload) in fragment::split(&wire, max_data, fragment_id) {
            let fragment_packet = Packet::new(
                packet_type,
                self.me,
                packet.recipient,
                now_ms,
                fragment_payload,
            );
            match fragment_packet.encode() {
                Ok(fragment_wire) => {
                    self.dedup.admit(fragment_packet.dedup_id(), now_ms);
                    effects.push(Effect::Transmit { to: route, bytes: fragment_wire });
                }
                Err(e) => {
                    warn!(error = %e, "fragment encoding failed");
                }
            }
        }
        trace!(fragments = effects.len(), "send fragmented");
        effects
    }

    // ── Inbound ─────────────────────────────────────────────────────────

    /// Bytes arrived from a connected link.
    pub fn handle_incoming(&mut self, from: PeerId, bytes: &[u8], now_ms: u64) -> Vec<Effect> {
        let mut effects = Vec::new();
        if from != self.me && self.peers.record_sighting(from, now_ms) {
            effects.push(Effect::Emit(NodeEvent::PeerDiscovered { peer: from }));
        }
        effects.extend(self.process_wire(from, bytes, now_ms, true));
        effects
    }

    fn drop_packet(&self, reason: DropReason) -> Vec<Effect> {
        debug!(%reason, "dropping inbound packet");
        vec![Effect::Emit(NodeEvent::Log {
            line: format!("dropped inbound packet: {reason}"),
        })]
    }

    fn process_wire(
        &mut self,
        from: PeerId,
        bytes: &[u8],
        now_ms: u64,
        allow_relay: bool,
    ) -> Vec<Effect> {
        let inbound = match Packet::decode(bytes) {
            Ok(inbound) => inbound,
            Err(e) => return self.drop_packet(DropReason::Decode(e.to_string())),
        };
        let packet = &inbound.packet;

        if packet.sender == self.me {
            // Our own flood echoed back; the dedup entry exists already.
            trace!("ignoring own packet echo");
            return Vec::new();
        }
        if !plausible_timestamp(packet.timestamp_ms, now_ms) {
            return self.drop_packet(DropReason::ImplausibleTimestamp(packet.timestamp_ms));
        }

        // First side-effecting step: dedup admission.
        if !self.dedup.admit(packet.dedup_id(), now_ms) {
            trace!(sender = %packet.sender, "duplicate suppressed");
            return self.drop_packet(DropReason::Duplicate);
        }

        let mut effects = Vec::new();
        if packet.sender != from && self.peers.record_sighting(packet.sender, now_ms) {
            effects.push(Effect::Emit(NodeEvent::PeerDiscovered { peer: packet.sender }));
        }

        effects.extend(self.dispatch(&inbound, now_ms));

        // Relay with a decremented TTL; unknown types flood too.
        if allow_relay && packet.ttl > 0 {
            let mut relayed = bytes.to_vec();
            relayed[2] = packet.ttl - 1;
            trace!(sender = %packet.sender, ttl = packet.ttl - 1, "relaying");
            effects.push(Effect::Transmit { to: None, bytes: relayed });
        }
        effects
    }

    fn dispatch(&mut self, inbound: &InboundPacket, now_ms: u64) -> Vec<Effect> {
        let packet = &inbound.packet;
        match packet.packet_type {
            PacketType::KeyExchange => self.on_key_exchange(packet, now_ms),
            PacketType::Announce => self.on_announce(packet),
            PacketType::Leave => self.on_leave(packet),
            PacketType::Message => self.on_message(inbound),
            PacketType::FragmentStart | PacketType::FragmentCont | PacketType::FragmentEnd => {
                self.on_fragment(packet, now_ms)
            }
            PacketType::ChannelAnnounce => self.on_channel_announce(packet),
            PacketType::ChannelRetention => self.on_channel_retention(packet),
            PacketType::DeliveryAck
            | PacketType::DeliveryStatusRequest
            | PacketType::ReadReceipt => self.on_receipt(packet),
            PacketType::Unknown(raw) => {
                trace!(raw, "unknown packet type; relay only");
                Vec::new()
            }
        }
    }

    fn on_key_exchange(&mut self, packet: &Packet, now_ms: u64) -> Vec<Effect> {
        let had_session = self.keystore.has_session(&packet.sender);
        if let Err(e) = self.keystore.add_peer_key(packet.sender, &packet.payload) {
            return self.drop_packet(DropReason::Decode(e.to_string()));
        }

        // Answer with our own bundle, but only when this sender was not
        // already handshaken, and at most once per exchange id, so two
        // nodes discovering each other cannot ping-pong forever.
        let mut exchange_id = [0u8; 16];
        let head = packet.payload.len().min(16);
        exchange_id[..head].copy_from_slice(&packet.payload[..head]);

        let mut effects = Vec::new();
        if !had_session && self.replied_exchanges.insert((packet.sender, exchange_id)) {
            effects.extend(self.send_key_exchange(packet.sender, now_ms));
        }
        effects
    }

    fn on_announce(&mut self, packet: &Packet) -> Vec<Effect> {
        let nickname = String::from_utf8_lossy(&packet.payload).into_owned();
        let mut effects = Vec::new();

        if self.peers.set_nickname(&packet.sender, &nickname) {
            effects.push(Effect::Emit(NodeEvent::PeerUpdated {
                peer: packet.sender,
                nickname: Some(nickname.clone()),
                online: true,
            }));
        }

        if self.announced.insert(packet.sender) {
            effects.push(Effect::Emit(NodeEvent::PeerConnected {
                peer: packet.sender,
                nickname,
            }));
        }

        // The peer is reachable again: release anything parked for it.
        let parked = self.store.drain(&packet.sender);
        if !parked.is_empty() {
            debug!(peer = %packet.sender, count = parked.len(), "draining stored messages");
        }
        for stored in parked {
            effects.push(Effect::Transmit {
                to: Some(packet.sender),
                bytes: stored.wire,
            });
        }
        effects
    }

    fn on_leave(&mut self, packet: &Packet) -> Vec<Effect> {
        self.peers.mark_offline(&packet.sender);
        self.announced.remove(&packet.sender);
        vec![Effect::Emit(NodeEvent::PeerDisconnected { peer: packet.sender })]
    }

    fn on_message(&mut self, inbound: &InboundPacket) -> Vec<Effect> {
        let packet = &inbound.packet;

        if packet.is_broadcast() {
            // Verify when we can; an unknown sender's signature is
            // unverifiable and the message is accepted as unsigned.
            if let Some(signature) = &inbound.signature {
                if self.keystore.has_session(&packet.sender)
                    && !self
                        .keystore
                        .verify(&packet.sender, &inbound.signed_payload, signature)
                {
                    return self.drop_packet(DropReason::SignatureInvalid);
                }
            }

            let record = match MessageRecord::decode(&packet.payload) {
                Ok(record) => record,
                Err(e) => return self.drop_packet(DropReason::BadRecord(e)),
            };

            if let Some(channel) = &record.channel {
                if !self.channels.contains(channel) {
                    return self.drop_packet(DropReason::NotJoinedChannel(channel.clone()));
                }
            }

            return vec![Effect::Emit(NodeEvent::Message(ChatMessage {
                id: record.id,
                sender: packet.sender,
                sender_nickname: record.sender_nickname,
                content: String::from_utf8_lossy(&record.content).into_owned(),
                channel: record.channel,
                mentions: record.mentions,
                timestamp_ms: record.timestamp_ms,
                is_private: false,
            }))];
        }

        if packet.recipient == Some(self.me) {
            // Private for us: signature required, then decrypt and unpad.
            let Some(signature) = &inbound.signature else {
                return self.drop_packet(DropReason::SignatureMissing);
            };
            if !self
                .keystore
                .verify(&packet.sender, &inbound.signed_payload, signature)
            {
                return self.drop_packet(DropReason::SignatureInvalid);
            }
            let Some(padded) = self.keystore.decrypt_from(&packet.sender, &packet.payload) else {
                return self.drop_packet(DropReason::DecryptionFailed);
            };
            let record = match MessageRecord::decode(unpad(&padded)) {
                Ok(record) => record,
                Err(e) => return self.drop_packet(DropReason::BadRecord(e)),
            };

            return vec![Effect::Emit(NodeEvent::Message(ChatMessage {
                id: record.id,
                sender: packet.sender,
                sender_nickname: record.sender_nickname,
                content: String::from_utf8_lossy(&record.content).into_owned(),
                channel: record.channel,
                mentions: record.mentions,
                timestamp_ms: record.timestamp_ms,
                is_private: true,
            }))];
        }

        // A private message for a third party: we have no key, only the
        // relay step applies.
        trace!(recipient = ?packet.recipient, "relay-only private message");
        Vec::new()
    }

    fn on_fragment(&mut self, packet: &Packet, now_ms: u64) -> Vec<Effect> {
        match self.fragments.accept(packet.sender, &packet.payload, now_ms) {
            Ok(Some(whole)) => {
                debug!(sender = %packet.sender, len = whole.len(), "fragment set complete");
                // The reassembled bytes are a full packet; run it through
                // the inbound pipeline. The fragments themselves already
                // relayed, so the inner packet must not relay again.
                self.process_wire(packet.sender, &whole, now_ms, false)
            }
            Ok(None) => Vec::new(),
            Err(e) => self.drop_packet(DropReason::Decode(e.to_string())),
        }
    }

    fn on_channel_announce(&mut self, packet: &Packet) -> Vec<Effect> {
        // u8-len channel + u8 joined flag; tolerate trailing bytes.
        let Some((channel, rest)) = read_short_string(&packet.payload) else {
            return self.drop_packet(DropReason::Decode("short channel announce".into()));
        };
        let joined = rest.first().copied().unwrap_or(1) != 0;
        vec![Effect::Emit(NodeEvent::ChannelAnnounce {
            peer: packet.sender,
            channel,
            joined,
        })]
    }

    fn on_channel_retention(&mut self, packet: &Packet) -> Vec<Effect> {
        let Some((channel, rest)) = read_short_string(&packet.payload) else {
            return self.drop_packet(DropReason::Decode("short channel retention".into()));
        };
        let enabled = rest.first().copied().unwrap_or(0) != 0;
        vec![Effect::Emit(NodeEvent::ChannelRetention {
            peer: packet.sender,
            channel,
            enabled,
        })]
    }

    fn on_receipt(&mut self, packet: &Packet) -> Vec<Effect> {
        // Receipts are addressed; ones for other peers only relay.
        if packet.recipient != Some(self.me) {
            return Vec::new();
        }
        let Some((message_id, _)) = read_short_string(&packet.payload) else {
            return self.drop_packet(DropReason::Decode("short receipt".into()));
        };
        let event = match packet.packet_type {
            PacketType::DeliveryAck => NodeEvent::DeliveryAck {
                peer: packet.sender,
                message_id,
            },
            PacketType::DeliveryStatusRequest => NodeEvent::DeliveryStatusRequest {
                peer: packet.sender,
                message_id,
            },
            PacketType::ReadReceipt => NodeEvent::ReadReceipt {
                peer: packet.sender,
                message_id,
            },
            _ => unreachable!("caller matched receipt types"),
        };
        vec![Effect::Emit(event)]
    }
}

/// Read a u8-length-prefixed UTF-8 string, returning it and the rest.
fn read_short_string(payload: &[u8]) -> Option<(String, &[u8])> {
    let len = *payload.first()? as usize;
    if payload.len() < 1 + len {
        return None;
    }
    let s = std::str::from_utf8(&payload[1..1 + len]).ok()?;
    Some((s.to_string(), &payload[1 + len..]))
}

/// Random 128-bit message id in hex.
fn random_message_id() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Pull `@nickname` mentions out of message text.
fn extract_mentions(content: &str) -> Vec<String> {
    let mut mentions = Vec::new();
    for token in content.split_whitespace() {
        if let Some(name) = token.strip_prefix('@') {
            let name = name.trim_end_matches(['.', ',', ':', ';', '!', '?']);
            if !name.is_empty() && !mentions.iter().any(|m| m == name) {
                mentions.push(name.to_string());
            }
        }
    }
    mentions
}
