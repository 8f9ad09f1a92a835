//! Store-and-forward buffer.
//!
//! A neutral per-recipient queue with two retention classes: regular
//! (12 h) and favorites (168 h). Messages queue while a peer is absent
//! and drain in insertion order when its next ANNOUNCE arrives.

use std::collections::{HashMap, VecDeque};

use hush_protocol::limits::{STORE_FAVORITE_RETENTION, STORE_REGULAR_RETENTION};
use hush_protocol::PeerId;

/// Retention class of a stored message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetentionClass {
    /// Regular queue, 12-hour retention.
    Regular,
    /// Favorites queue, 168-hour retention.
    Favorite,
}

impl RetentionClass {
    fn retention_ms(self) -> u64 {
        match self {
            Self::Regular => STORE_REGULAR_RETENTION.as_millis() as u64,
            Self::Favorite => STORE_FAVORITE_RETENTION.as_millis() as u64,
        }
    }
}

/// A message parked for an absent peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredMessage {
    /// Message id from the enclosed record.
    pub id: String,
    /// Originating peer.
    pub sender: PeerId,
    /// Target peer, absent for channel backlog.
    pub recipient: Option<PeerId>,
    /// Channel name, when a channel message.
    pub channel: Option<String>,
    /// Plaintext content or ciphertext, as it will hit the wire.
    pub content: Vec<u8>,
    /// Sender-stamped unix milliseconds.
    pub timestamp_ms: u64,
    /// Whether the content is end-to-end encrypted.
    pub is_private: bool,
    /// Whether the wire form carries a signature.
    pub is_signed: bool,
    /// The fully encoded packet to replay on the transport.
    pub wire: Vec<u8>,
    /// When the message entered the queue, engine milliseconds.
    pub stored_at_ms: u64,
}

#[derive(Debug, Default)]
struct Queues {
    regular: VecDeque<StoredMessage>,
    favorite: VecDeque<StoredMessage>,
}

/// Per-peer store-and-forward queues.
#[derive(Debug, Default)]
pub struct MessageStore {
    by_peer: HashMap<PeerId, Queues>,
}

impl MessageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a message for `peer` in the given retention class.
    pub fn enqueue(&mut self, peer: PeerId, message: StoredMessage, class: RetentionClass) {
        let queues = self.by_peer.entry(peer).or_default();
        match class {
            RetentionClass::Regular => queues.regular.push_back(message),
            RetentionClass::Favorite => queues.favorite.push_back(message),
        }
    }

    /// Drain everything queued for `peer`, oldest first across both
    /// classes.
    pub fn drain(&mut self, peer: &PeerId) -> Vec<StoredMessage> {
        let Some(queues) = self.by_peer.remove(peer) else {
            return Vec::new();
        };
        let mut all: Vec<StoredMessage> = queues
            .regular
            .into_iter()
            .chain(queues.favorite)
            .collect();
        all.sort_by_key(|m| m.stored_at_ms);
        all
    }

    /// Whether anything is queued for `peer`.
    pub fn has_queued(&self, peer: &PeerId) -> bool {
        self.by_peer
            .get(peer)
            .is_some_and(|q| !q.regular.is_empty() || !q.favorite.is_empty())
    }

    /// Messages queued for `peer`.
    pub fn queued_count(&self, peer: &PeerId) -> usize {
        self.by_peer
            .get(peer)
            .map_or(0, |q| q.regular.len() + q.favorite.len())
    }

    /// Enforce both retention windows. Returns how many messages expired.
    pub fn purge_expired(&mut self, now_ms: u64) -> usize {
        let mut removed = 0;
        self.by_peer.retain(|_, queues| {
            let keep = |class: RetentionClass| {
                let cutoff = class.retention_ms();
                move |m: &StoredMessage| now_ms.saturating_sub(m.stored_at_ms) <= cutoff
            };

            let before = queues.regular.len() + queues.favorite.len();
            queues.regular.retain(keep(RetentionClass::Regular));
            queues.favorite.retain(keep(RetentionClass::Favorite));
            removed += before - (queues.regular.len() + queues.favorite.len());

            !queues.regular.is_empty() || !queues.favorite.is_empty()
        });
        removed
    }

    /// Total messages across all peers.
    pub fn total_queued(&self) -> usize {
        self.by_peer
            .values()
            .map(|q| q.regular.len() + q.favorite.len())
            .sum()
    }

    /// Drop everything (session stop).
    pub fn clear(&mut self) {
        self.by_peer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(s: &str) -> PeerId {
        PeerId::parse(s).unwrap()
    }

    fn message(id: &str, stored_at_ms: u64) -> StoredMessage {
        StoredMessage {
            id: id.to_string(),
            sender: peer("AAAAAAAA"),
            recipient: Some(peer("CCCCCCCC")),
            channel: None,
            content: b"parked".to_vec(),
            timestamp_ms: stored_at_ms,
            is_private: false,
            is_signed: true,
            wire: vec![1, 2, 3],
            stored_at_ms,
        }
    }

    #[test]
    fn drain_is_fifo() {
        let mut store = MessageStore::new();
        let c = peer("CCCCCCCC");

        store.enqueue(c, message("m1", 10), RetentionClass::Regular);
        store.enqueue(c, message("m2", 20), RetentionClass::Regular);
        store.enqueue(c, message("m3", 30), RetentionClass::Regular);

        let drained = store.drain(&c);
        let ids: Vec<&str> = drained.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2", "m3"]);
        assert!(!store.has_queued(&c));
    }

    #[test]
    fn drain_interleaves_classes_by_age() {
        let mut store = MessageStore::new();
        let c = peer("CCCCCCCC");

        store.enqueue(c, message("fav-old", 5), RetentionClass::Favorite);
        store.enqueue(c, message("reg", 10), RetentionClass::Regular);
        store.enqueue(c, message("fav-new", 15), RetentionClass::Favorite);

        let ids: Vec<String> = store.drain(&c).into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["fav-old", "reg", "fav-new"]);
    }

    #[test]
    fn drain_unknown_peer_is_empty() {
        let mut store = MessageStore::new();
        assert!(store.drain(&peer("DDDDDDDD")).is_empty());
    }

    #[test]
    fn regular_retention_is_twelve_hours() {
        let mut store = MessageStore::new();
        let c = peer("CCCCCCCC");
        let twelve_h = STORE_REGULAR_RETENTION.as_millis() as u64;

        store.enqueue(c, message("old", 0), RetentionClass::Regular);
        store.enqueue(c, message("fresh", twelve_h), RetentionClass::Regular);

        assert_eq!(store.purge_expired(twelve_h + 1), 1);
        let ids: Vec<String> = store.drain(&c).into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["fresh"]);
    }

    #[test]
    fn favorites_outlive_regulars() {
        let mut store = MessageStore::new();
        let c = peer("CCCCCCCC");
        let twelve_h = STORE_REGULAR_RETENTION.as_millis() as u64;
        let week = STORE_FAVORITE_RETENTION.as_millis() as u64;

        store.enqueue(c, message("reg", 0), RetentionClass::Regular);
        store.enqueue(c, message("fav", 0), RetentionClass::Favorite);

        // Past regular retention: only the regular message expires.
        assert_eq!(store.purge_expired(twelve_h + 1), 1);
        assert_eq!(store.queued_count(&c), 1);

        // Past favorite retention: the favorite goes too.
        assert_eq!(store.purge_expired(week + 1), 1);
        assert_eq!(store.queued_count(&c), 0);
        assert_eq!(store.total_queued(), 0);
    }

    #[test]
    fn purge_drops_empty_peer_entries() {
        let mut store = MessageStore::new();
        let c = peer("CCCCCCCC");
        let twelve_h = STORE_REGULAR_RETENTION.as_millis() as u64;

        store.enqueue(c, message("old", 0), RetentionClass::Regular);
        store.purge_expired(twelve_h + 1);
        assert!(!store.has_queued(&c));
        assert_eq!(store.total_queued(), 0);
    }
}
