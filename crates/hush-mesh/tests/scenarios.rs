//! End-to-end scenarios over the pure state machines.
//!
//! A tiny in-test mesh shuttles `Transmit` effects between nodes along an
//! adjacency list, so multi-hop floods, dedup, and store-and-forward run
//! deterministically without a runtime.

use std::collections::VecDeque;

use hush_crypto::SessionIdentity;
use hush_mesh::{
    ChatMessage, Effect, MeshConfig, MeshError, MeshState, NodeEvent, SendRequest, StoredMessage,
};
use hush_protocol::{Packet, PacketType, PeerId};

/// A reference time well after protocol inception.
const NOW: u64 = 1_750_000_000_000;

fn peer(s: &str) -> PeerId {
    PeerId::parse(s).unwrap()
}

fn node(id: &str, nickname: &str) -> MeshState {
    MeshState::new(
        peer(id),
        nickname.to_string(),
        SessionIdentity::generate(),
        MeshConfig::default(),
    )
}

/// One captured transmission.
#[derive(Clone, Debug)]
struct Wire {
    from: usize,
    to: Option<PeerId>,
    bytes: Vec<u8>,
}

/// A test mesh: nodes plus undirected links.
struct Mesh {
    nodes: Vec<MeshState>,
    links: Vec<(usize, usize)>,
    /// Upstream events per node.
    events: Vec<Vec<NodeEvent>>,
    /// Every wire emission per node, for flag and TTL inspection.
    emissions: Vec<Vec<Wire>>,
}

impl Mesh {
    fn new(nodes: Vec<MeshState>, links: &[(usize, usize)]) -> Self {
        let n = nodes.len();
        Self {
            nodes,
            links: links.to_vec(),
            events: vec![Vec::new(); n],
            emissions: vec![Vec::new(); n],
        }
    }

    fn neighbors(&self, idx: usize) -> Vec<usize> {
        self.links
            .iter()
            .filter_map(|&(a, b)| match () {
                _ if a == idx => Some(b),
                _ if b == idx => Some(a),
                _ => None,
            })
            .collect()
    }

    /// Absorb effects from `idx`, routing transmissions until quiescence.
    fn pump(&mut self, idx: usize, effects: Vec<Effect>, now: u64) {
        let mut queue: VecDeque<Wire> = VecDeque::new();
        self.absorb(idx, effects, &mut queue, now);

        while let Some(wire) = queue.pop_front() {
            let source_id = self.nodes[wire.from].local_id();
            for dst in self.neighbors(wire.from) {
                if let Some(target) = wire.to {
                    if self.nodes[dst].local_id() != target {
                        continue;
                    }
                }
                let produced = self.nodes[dst].handle_incoming(source_id, &wire.bytes, now);
                self.absorb(dst, produced, &mut queue, now);
            }
        }
    }

    fn absorb(&mut self, idx: usize, effects: Vec<Effect>, queue: &mut VecDeque<Wire>, now: u64) {
        let mut stack = effects;
        while !stack.is_empty() {
            let mut next = Vec::new();
            for effect in stack {
                match effect {
                    Effect::Transmit { to, bytes } => {
                        let wire = Wire { from: idx, to, bytes };
                        self.emissions[idx].push(wire.clone());
                        queue.push_back(wire);
                    }
                    Effect::Emit(event) => self.events[idx].push(event),
                    Effect::PrepareAsync { job_id, payload } => {
                        // No worker in the pure harness: prepare inline.
                        let prepared = hush_protocol::prepare_section(&payload);
                        next.extend(self.nodes[idx].handle_crypto_done(job_id, Ok(prepared), now));
                    }
                }
            }
            stack = next;
        }
    }

    fn messages(&self, idx: usize) -> Vec<&ChatMessage> {
        self.events[idx]
            .iter()
            .filter_map(|e| match e {
                NodeEvent::Message(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    /// Wire emissions of a given packet type.
    fn emissions_of(&self, idx: usize, packet_type: PacketType) -> Vec<&Wire> {
        self.emissions[idx]
            .iter()
            .filter(|w| {
                Packet::decode(&w.bytes)
                    .map(|d| d.packet.packet_type == packet_type)
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Run the discovery handshake both ways and announce both nodes.
    fn introduce(&mut self, a: usize, b: usize, now: u64) {
        let b_id = self.nodes[b].local_id();
        let a_id = self.nodes[a].local_id();

        let effects = self.nodes[a].handle_peer_seen(b_id, None, now);
        self.pump(a, effects, now);
        let effects = self.nodes[b].handle_peer_seen(a_id, None, now);
        self.pump(b, effects, now);

        let effects = self.nodes[a].tick_announce(now);
        self.pump(a, effects, now);
        let effects = self.nodes[b].tick_announce(now);
        self.pump(b, effects, now);
    }
}

// ── S1: broadcast round-trip ────────────────────────────────────────────

#[test]
fn s1_broadcast_roundtrip() {
    let mut mesh = Mesh::new(
        vec![node("AAAAAAAA", "Alice"), node("BBBBBBBB", "Bob")],
        &[(0, 1)],
    );
    mesh.introduce(0, 1, NOW);

    // Announces landed: B knows Alice by name.
    assert!(mesh.events[1]
        .iter()
        .any(|e| matches!(e, NodeEvent::PeerConnected { nickname, .. } if nickname == "Alice")));
    assert!(mesh.nodes[0].has_session(&peer("BBBBBBBB")));
    assert!(mesh.nodes[1].has_session(&peer("AAAAAAAA")));

    let (effects, outcome) = mesh.nodes[0].handle_send(
        SendRequest::Broadcast { content: "hi".into() },
        NOW + 1_000,
    );
    assert!(outcome.is_ok());
    mesh.pump(0, effects, NOW + 1_000);

    let delivered = mesh.messages(1);
    assert_eq!(delivered.len(), 1);
    let message = delivered[0];
    assert_eq!(message.content, "hi");
    assert_eq!(message.sender_nickname, "Alice");
    assert_eq!(message.sender, peer("AAAAAAAA"));
    assert!(!message.is_private);
    assert_eq!(message.channel, None);
}

// ── S2: private encryption ──────────────────────────────────────────────

#[test]
fn s2_private_encryption() {
    let mut mesh = Mesh::new(
        vec![
            node("AAAAAAAA", "Alice"),
            node("BBBBBBBB", "Bob"),
            node("CCCCCCCC", "Carol"),
        ],
        &[(0, 1), (0, 2)],
    );
    mesh.introduce(0, 1, NOW);

    let (effects, outcome) = mesh.nodes[0].handle_send(
        SendRequest::Private {
            to: peer("BBBBBBBB"),
            content: "secret".into(),
        },
        NOW + 1_000,
    );
    assert!(outcome.is_ok());
    mesh.pump(0, effects, NOW + 1_000);

    // Inspect the captured wire form.
    let wires = mesh.emissions_of(0, PacketType::Message);
    assert_eq!(wires.len(), 1);
    let decoded = Packet::decode(&wires[0].bytes).unwrap();
    assert_eq!(decoded.packet.recipient, Some(peer("BBBBBBBB")));
    assert!(decoded.signature.is_some());
    assert!(!decoded.was_compressed);
    assert_ne!(decoded.packet.payload, b"secret".to_vec());
    assert!(!decoded
        .packet
        .payload
        .windows(6)
        .any(|w| w == b"secret"));

    // Bob got exactly one private message.
    let delivered = mesh.messages(1);
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].content, "secret");
    assert!(delivered[0].is_private);

    // Carol heard the packet (she relays) but cannot produce a plaintext.
    assert!(mesh.messages(2).is_empty());
}

#[test]
fn s2_private_without_session_fails_and_initiates_handshake() {
    let mut mesh = Mesh::new(
        vec![node("AAAAAAAA", "Alice"), node("BBBBBBBB", "Bob")],
        &[(0, 1)],
    );

    let (effects, outcome) = mesh.nodes[0].handle_send(
        SendRequest::Private {
            to: peer("BBBBBBBB"),
            content: "early".into(),
        },
        NOW,
    );
    assert!(matches!(outcome, Err(MeshError::NoSharedSecret(_))));
    mesh.pump(0, effects, NOW);

    // The failed send still kicked off the key exchange.
    assert!(mesh.nodes[0].has_session(&peer("BBBBBBBB")));
    assert!(mesh.nodes[1].has_session(&peer("AAAAAAAA")));

    // A retry now succeeds.
    let (effects, outcome) = mesh.nodes[0].handle_send(
        SendRequest::Private {
            to: peer("BBBBBBBB"),
            content: "again".into(),
        },
        NOW + 10,
    );
    assert!(outcome.is_ok());
    mesh.pump(0, effects, NOW + 10);
    assert_eq!(mesh.messages(1).len(), 1);
}

// ── S3: TTL flood along a chain ─────────────────────────────────────────

#[test]
fn s3_ttl_flood_chain() {
    let mut mesh = Mesh::new(
        vec![
            node("AAAAAAAA", "Alice"),
            node("R1R1R1R1", "RelayOne"),
            node("R2R2R2R2", "RelayTwo"),
            node("BBBBBBBB", "Bob"),
        ],
        &[(0, 1), (1, 2), (2, 3)],
    );

    let (effects, outcome) = mesh.nodes[0].handle_send(
        SendRequest::Broadcast { content: "ping".into() },
        NOW,
    );
    assert!(outcome.is_ok());
    mesh.pump(0, effects, NOW);

    // B receives exactly once.
    let delivered = mesh.messages(3);
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].content, "ping");

    // TTL walks down one per hop: A emits 7, R1 6, R2 5, B relays at 4.
    let ttl_of = |wire: &Wire| Packet::decode(&wire.bytes).unwrap().packet.ttl;
    let a = mesh.emissions_of(0, PacketType::Message);
    let r1 = mesh.emissions_of(1, PacketType::Message);
    let r2 = mesh.emissions_of(2, PacketType::Message);
    let b = mesh.emissions_of(3, PacketType::Message);

    assert_eq!(a.len(), 1);
    assert_eq!(r1.len(), 1, "R1 relays exactly once");
    assert_eq!(r2.len(), 1, "R2 relays exactly once");
    assert_eq!(b.len(), 1, "B floods onward once");
    assert_eq!(ttl_of(a[0]), 7);
    assert_eq!(ttl_of(r1[0]), 6);
    assert_eq!(ttl_of(r2[0]), 5);
    assert_eq!(ttl_of(b[0]), 4);
}

#[test]
fn s3_ttl_zero_never_relays() {
    let mut mesh = Mesh::new(
        vec![node("AAAAAAAA", "Alice"), node("R1R1R1R1", "Relay")],
        &[(0, 1)],
    );

    // Hand-build a TTL-0 announce and inject it at the relay.
    let packet = Packet {
        packet_type: PacketType::Announce,
        ttl: 0,
        timestamp_ms: NOW,
        sender: peer("AAAAAAAA"),
        recipient: None,
        payload: b"Alice".to_vec(),
    };
    let wire = packet.encode().unwrap();
    let effects = mesh.nodes[1].handle_incoming(peer("AAAAAAAA"), &wire, NOW);
    mesh.pump(1, effects, NOW);

    assert!(mesh.emissions_of(1, PacketType::Announce).is_empty());
}

// ── S4: duplicate suppression across two paths ──────────────────────────

#[test]
fn s4_duplicate_suppression() {
    // Diamond: A - R1 - B and A - R2 - B.
    let mut mesh = Mesh::new(
        vec![
            node("AAAAAAAA", "Alice"),
            node("R1R1R1R1", "RelayOne"),
            node("R2R2R2R2", "RelayTwo"),
            node("BBBBBBBB", "Bob"),
        ],
        &[(0, 1), (0, 2), (1, 3), (2, 3)],
    );

    let before = mesh.nodes[3].dedup_len();
    let (effects, _) = mesh.nodes[0].handle_send(
        SendRequest::Broadcast { content: "once".into() },
        NOW,
    );
    mesh.pump(0, effects, NOW);

    // Both paths delivered the same packet to B; exactly one event.
    assert_eq!(mesh.messages(3).len(), 1);
    // And exactly one new dedup entry at B.
    assert_eq!(mesh.nodes[3].dedup_len(), before + 1);
}

// ── S5: store and forward ───────────────────────────────────────────────

#[test]
fn s5_store_and_forward() {
    let mut mesh = Mesh::new(
        vec![node("AAAAAAAA", "Alice"), node("CCCCCCCC", "Carol")],
        &[(0, 1)],
    );
    mesh.introduce(0, 1, NOW);

    // Carol leaves.
    let (effects, _) = mesh.nodes[1].handle_send(
        SendRequest::Broadcast { content: "bye".into() },
        NOW,
    );
    mesh.pump(1, effects, NOW);
    let leave_effects = mesh.nodes[1].leave(NOW + 1_000);
    mesh.pump(1, leave_effects, NOW + 1_000);
    assert!(mesh.events[0]
        .iter()
        .any(|e| matches!(e, NodeEvent::PeerDisconnected { peer: p } if *p == peer("CCCCCCCC"))));

    // Mark Carol favorite and park a message for her.
    let carol = peer("CCCCCCCC");
    let (effects, _) = mesh.nodes[0].handle_send(
        SendRequest::SetFavorite { peer: carol, favorite: true },
        NOW + 2_000,
    );
    assert!(effects.is_empty());

    let parked_wire = {
        let packet = Packet::new(
            PacketType::Message,
            peer("AAAAAAAA"),
            Some(carol),
            NOW + 2_000,
            b"parked payload".to_vec(),
        );
        packet.encode().unwrap()
    };
    mesh.nodes[0].park(
        carol,
        StoredMessage {
            id: "queued-1".into(),
            sender: peer("AAAAAAAA"),
            recipient: Some(carol),
            channel: None,
            content: b"parked payload".to_vec(),
            timestamp_ms: NOW + 2_000,
            is_private: false,
            is_signed: false,
            wire: parked_wire.clone(),
            stored_at_ms: NOW + 2_000,
        },
    );
    assert_eq!(mesh.nodes[0].message_store().queued_count(&carol), 1);

    // Ten seconds later Carol re-announces; the queue drains to her.
    let announce = mesh.nodes[1].tick_announce(NOW + 12_000);
    mesh.pump(1, announce, NOW + 12_000);

    let released: Vec<&Wire> = mesh.emissions[0]
        .iter()
        .filter(|w| w.bytes == parked_wire)
        .collect();
    assert_eq!(released.len(), 1);
    assert_eq!(released[0].to, Some(carol));
    assert_eq!(mesh.nodes[0].message_store().queued_count(&carol), 0);
}

// ── S6: fragment reassembly ─────────────────────────────────────────────

#[test]
fn s6_fragment_reassembly() {
    let mut mesh = Mesh::new(
        vec![node("AAAAAAAA", "Alice"), node("BBBBBBBB", "Bob")],
        &[(0, 1)],
    );
    mesh.introduce(0, 1, NOW);

    // 1,500 bytes force fragmentation at the 512-byte MTU. A single-byte
    // run keeps the entropy gate closed, so no compression interferes.
    let big = "x".repeat(1_500);

    let (effects, outcome) = mesh.nodes[0].handle_send(
        SendRequest::Broadcast { content: big.clone() },
        NOW + 1_000,
    );
    assert!(outcome.is_ok());
    mesh.pump(0, effects, NOW + 1_000);

    // The wire carried fragments, all under one fragment id.
    let starts = mesh.emissions_of(0, PacketType::FragmentStart);
    let ends = mesh.emissions_of(0, PacketType::FragmentEnd);
    assert_eq!(starts.len(), 1);
    assert_eq!(ends.len(), 1);
    let fragment_id_of = |wire: &Wire| {
        let decoded = Packet::decode(&wire.bytes).unwrap();
        decoded.packet.payload[..8].to_vec()
    };
    assert_eq!(fragment_id_of(starts[0]), fragment_id_of(ends[0]));

    // Exactly one reassembled delivery, intact.
    let delivered = mesh.messages(1);
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].content, big);
}

#[test]
fn s6_missing_middle_fragment_expires() {
    let mut a = node("AAAAAAAA", "Alice");
    let mut b = node("BBBBBBBB", "Bob");

    let big = "x".repeat(1_500);
    let (effects, _) = a.handle_send(SendRequest::Broadcast { content: big }, NOW);

    // Collect A's fragment wires without routing them.
    let mut wires: Vec<Vec<u8>> = Vec::new();
    for effect in effects {
        if let Effect::Transmit { bytes, .. } = effect {
            wires.push(bytes);
        }
    }
    assert!(wires.len() >= 3, "expected a fragment train");

    // Deliver all but one middle fragment.
    for (i, wire) in wires.iter().enumerate() {
        if i == 1 {
            continue;
        }
        let effects = b.handle_incoming(peer("AAAAAAAA"), wire, NOW);
        for effect in &effects {
            assert!(
                !matches!(effect, Effect::Emit(NodeEvent::Message(_))),
                "no delivery without the full set"
            );
        }
    }
    assert_eq!(b.pending_fragments(), 1);

    // The buffer clears after the 60 s timeout.
    b.tick_gc(NOW + 61_000);
    assert_eq!(b.pending_fragments(), 0);
}

// ── Channel membership gating ───────────────────────────────────────────

#[test]
fn channel_messages_deliver_only_to_members() {
    let mut mesh = Mesh::new(
        vec![
            node("AAAAAAAA", "Alice"),
            node("BBBBBBBB", "Bob"),
            node("CCCCCCCC", "Carol"),
        ],
        &[(0, 1), (0, 2)],
    );
    mesh.introduce(0, 1, NOW);
    mesh.introduce(0, 2, NOW);

    for idx in [0, 1] {
        let (effects, _) = mesh.nodes[idx].handle_send(
            SendRequest::JoinChannel { name: "#rust".into() },
            NOW + 500,
        );
        mesh.pump(idx, effects, NOW + 500);
    }

    let (effects, _) = mesh.nodes[0].handle_send(
        SendRequest::Channel {
            name: "#rust".into(),
            content: "channel hello".into(),
        },
        NOW + 1_000,
    );
    mesh.pump(0, effects, NOW + 1_000);

    // Bob (member) gets it; Carol (non-member) does not.
    let bob = mesh.messages(1);
    assert_eq!(bob.len(), 1);
    assert_eq!(bob[0].channel.as_deref(), Some("#rust"));
    assert!(mesh.messages(2).is_empty());

    // Membership announcements surfaced as events.
    assert!(mesh.events[1]
        .iter()
        .any(|e| matches!(e, NodeEvent::ChannelAnnounce { channel, joined: true, .. } if channel == "#rust")));
}

// ── Handshake idempotence (property 10) ─────────────────────────────────

#[test]
fn repeated_key_exchange_does_not_rotate_keys() {
    let mut mesh = Mesh::new(
        vec![node("AAAAAAAA", "Alice"), node("BBBBBBBB", "Bob")],
        &[(0, 1)],
    );
    mesh.introduce(0, 1, NOW);

    // Re-run discovery; sessions stay put and messages still decrypt.
    let b_id = peer("BBBBBBBB");
    let effects = mesh.nodes[0].handle_peer_seen(b_id, None, NOW + 5_000);
    mesh.pump(0, effects, NOW + 5_000);

    let (effects, outcome) = mesh.nodes[0].handle_send(
        SendRequest::Private { to: b_id, content: "still works".into() },
        NOW + 6_000,
    );
    assert!(outcome.is_ok());
    mesh.pump(0, effects, NOW + 6_000);

    let delivered = mesh.messages(1);
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].content, "still works");
}

// ── Hostile inbound never surfaces errors ───────────────────────────────

#[test]
fn hostile_bytes_are_dropped_quietly() {
    let mut b = node("BBBBBBBB", "Bob");

    // Undecodable input: no delivery, no relay, no panic.
    for garbage in [vec![], vec![0x00; 5], vec![0xFF; 64]] {
        let effects = b.handle_incoming(peer("MMMMMMMM"), &garbage, NOW);
        for effect in effects {
            assert!(
                matches!(
                    effect,
                    Effect::Emit(NodeEvent::Log { .. })
                        | Effect::Emit(NodeEvent::PeerDiscovered { .. })
                ),
                "undecodable bytes may only produce a log line"
            );
        }
    }

    // A well-formed private packet without a signature: relayed per the
    // flood rules, but never delivered and never a caller-visible error.
    let packet = Packet::new(
        PacketType::Message,
        peer("MMMMMMMM"),
        Some(peer("BBBBBBBB")),
        NOW,
        vec![0xAA; 40],
    );
    let effects = b.handle_incoming(peer("MMMMMMMM"), &packet.encode().unwrap(), NOW);
    assert!(
        !effects
            .iter()
            .any(|e| matches!(e, Effect::Emit(NodeEvent::Message(_)))),
        "unsigned private payload must not deliver"
    );
}
