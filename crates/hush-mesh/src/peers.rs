//! The peer table.
//!
//! Peers are created on first sighting (advertisement, announce, or any
//! inbound packet) and evicted on LEAVE or after the eviction window with
//! no sightings. All mutation happens on the coordinator.

use std::collections::HashMap;

use hush_protocol::limits::PEER_EVICTION;
use hush_protocol::PeerId;

/// One known neighbor.
#[derive(Clone, Debug, Default)]
pub struct Peer {
    /// Nickname from the peer's last ANNOUNCE.
    pub nickname: Option<String>,
    /// Last observed signal strength, when the driver reports one.
    pub rssi: Option<i16>,
    /// Last sighting, engine milliseconds.
    pub last_seen_ms: u64,
    /// False after a LEAVE until the peer is seen again.
    pub online: bool,
    /// Favorite peers get the long store-and-forward retention class.
    pub favorite: bool,
    /// Combined-public digest from the advertisement, when present.
    pub advertised_digest: Option<[u8; 32]>,
}

/// All known neighbors, keyed by peer id.
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: HashMap<PeerId, Peer>,
}

impl PeerTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sighting, creating the peer if needed.
    ///
    /// Returns `true` when this is a brand new peer.
    pub fn record_sighting(&mut self, peer: PeerId, now_ms: u64) -> bool {
        let is_new = !self.peers.contains_key(&peer);
        let entry = self.peers.entry(peer).or_default();
        entry.last_seen_ms = now_ms;
        entry.online = true;
        is_new
    }

    /// Record the advertised key digest from a discovery event.
    pub fn record_digest(&mut self, peer: &PeerId, digest: [u8; 32]) {
        if let Some(entry) = self.peers.get_mut(peer) {
            entry.advertised_digest = Some(digest);
        }
    }

    /// Update the nickname from an ANNOUNCE.
    ///
    /// Returns `true` when the nickname changed.
    pub fn set_nickname(&mut self, peer: &PeerId, nickname: &str) -> bool {
        match self.peers.get_mut(peer) {
            Some(entry) => {
                let changed = entry.nickname.as_deref() != Some(nickname);
                entry.nickname = Some(nickname.to_string());
                changed
            }
            None => false,
        }
    }

    /// Record the driver-reported signal strength.
    pub fn set_rssi(&mut self, peer: &PeerId, rssi: i16) {
        if let Some(entry) = self.peers.get_mut(peer) {
            entry.rssi = Some(rssi);
        }
    }

    /// Mark a peer offline (LEAVE or link loss). The entry survives so
    /// store-and-forward and favorites keep working.
    pub fn mark_offline(&mut self, peer: &PeerId) {
        if let Some(entry) = self.peers.get_mut(peer) {
            entry.online = false;
        }
    }

    /// Toggle the favorite flag, creating the peer if unknown.
    pub fn set_favorite(&mut self, peer: PeerId, favorite: bool) {
        self.peers.entry(peer).or_default().favorite = favorite;
    }

    /// Whether the peer is marked favorite.
    pub fn is_favorite(&self, peer: &PeerId) -> bool {
        self.peers.get(peer).is_some_and(|p| p.favorite)
    }

    /// Look up one peer.
    pub fn get(&self, peer: &PeerId) -> Option<&Peer> {
        self.peers.get(peer)
    }

    /// The nickname for a peer, falling back to its id.
    pub fn display_name(&self, peer: &PeerId) -> String {
        self.peers
            .get(peer)
            .and_then(|p| p.nickname.clone())
            .unwrap_or_else(|| peer.display())
    }

    /// Evict peers unseen for the eviction window. Returns the evicted ids.
    pub fn evict_stale(&mut self, now_ms: u64) -> Vec<PeerId> {
        let window_ms = PEER_EVICTION.as_millis() as u64;
        let stale: Vec<PeerId> = self
            .peers
            .iter()
            .filter(|(_, p)| now_ms.saturating_sub(p.last_seen_ms) > window_ms)
            .map(|(id, _)| *id)
            .collect();
        for id in &stale {
            self.peers.remove(id);
        }
        stale
    }

    /// Remove one peer outright.
    pub fn remove(&mut self, peer: &PeerId) -> bool {
        self.peers.remove(peer).is_some()
    }

    /// Number of known peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Drop everything (session stop).
    pub fn clear(&mut self) {
        self.peers.clear();
    }
}
