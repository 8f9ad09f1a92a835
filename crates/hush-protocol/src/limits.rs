//! Protocol limits and timing constants.
//!
//! All tunables live here so the engine and the codecs agree.

use std::time::Duration;

// === Wire ===

/// Current wire protocol version. Decoders reject anything else.
pub const PROTOCOL_VERSION: u8 = 1;

/// Initial TTL for control packets (announce, key exchange, leave, ...).
pub const TTL_CONTROL: u8 = 3;

/// Initial TTL for data packets (messages, fragments).
pub const TTL_DATA: u8 = 7;

/// Default MTU budget per transport write; larger packets are fragmented.
pub const DEFAULT_MTU: usize = 512;

// === Compression ===

/// Minimum payload length before compression is attempted.
pub const COMPRESSION_MIN_LEN: usize = 100;

/// Minimum Shannon entropy (bits per byte) before compression is attempted.
pub const COMPRESSION_MIN_ENTROPY: f64 = 4.0;

/// A compressed form is only kept at or below this fraction of the original.
pub const COMPRESSION_MAX_RATIO: f64 = 0.8;

/// Hard cap on decompressed payload size; anything larger is hostile.
pub const MAX_DECOMPRESSED_LEN: usize = 256 * 1024;

// === Padding ===

/// Block sizes private payloads are padded up to.
pub const PADDING_BLOCKS: &[usize] = &[256, 512, 1024, 2048];

// === Fragmentation ===

/// How long an incomplete fragment set is kept before it is discarded.
pub const FRAGMENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Reassembly buffer cap per peer (4 maximum-size payloads).
pub const REASSEMBLY_CAP_BYTES: usize = 4 * 64 * 1024;

// === Engine timing ===

/// Interval between self-announces (also sent immediately on start).
pub const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(30);

/// Interval between garbage-collection sweeps.
pub const GC_INTERVAL: Duration = Duration::from_secs(60);

/// A peer unseen for this long is evicted.
pub const PEER_EVICTION: Duration = Duration::from_secs(5 * 60);

/// Dedup entries older than this are swept.
pub const DEDUP_RETENTION: Duration = Duration::from_secs(10 * 60);

/// Bounded capacity of the dedup set; oldest entries are evicted beyond it.
pub const DEDUP_CAPACITY: usize = 10_000;

// === Store and forward ===

/// Retention for the regular store-and-forward class.
pub const STORE_REGULAR_RETENTION: Duration = Duration::from_secs(12 * 60 * 60);

/// Retention for the favorites store-and-forward class.
pub const STORE_FAVORITE_RETENTION: Duration = Duration::from_secs(168 * 60 * 60);
