//! Duplicate-flood suppression.
//!
//! A bounded set of 64-bit packet ids. Capacity eviction is LRU; a
//! periodic sweep additionally drops entries past the retention window so
//! a quiet mesh does not pin ten thousand stale ids.

use std::num::NonZeroUsize;

use lru::LruCache;

use hush_protocol::limits::{DEDUP_CAPACITY, DEDUP_RETENTION};

/// Bounded set of recently seen packet ids.
pub struct DedupSet {
    seen: LruCache<u64, u64>,
}

impl DedupSet {
    /// Create with the protocol's default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEDUP_CAPACITY)
    }

    /// Create with an explicit capacity (tests).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: LruCache::new(NonZeroUsize::new(capacity.max(1)).expect("non-zero")),
        }
    }

    /// Admit a packet id.
    ///
    /// Returns `true` when the id is new (process the packet) and `false`
    /// for a duplicate. Duplicates refresh recency but not the insertion
    /// timestamp used by the age sweep.
    pub fn admit(&mut self, id: u64, now_ms: u64) -> bool {
        if self.seen.get(&id).is_some() {
            return false;
        }
        self.seen.put(id, now_ms);
        true
    }

    /// Whether an id has been seen (no recency update).
    pub fn contains(&self, id: u64) -> bool {
        self.seen.peek(&id).is_some()
    }

    /// Drop entries older than the retention window. Returns how many.
    pub fn sweep(&mut self, now_ms: u64) -> usize {
        let retention_ms = DEDUP_RETENTION.as_millis() as u64;
        let expired: Vec<u64> = self
            .seen
            .iter()
            .filter(|(_, &inserted)| now_ms.saturating_sub(inserted) > retention_ms)
            .map(|(&id, _)| id)
            .collect();
        for id in &expired {
            self.seen.pop(id);
        }
        expired.len()
    }

    /// Number of ids currently tracked.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Drop everything (session stop).
    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

impl Default for DedupSet {
    fn default() -> Self {
        Self::new()
    }
}
