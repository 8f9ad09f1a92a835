//! # hush-mesh
//!
//! The routing engine for the HUSH mesh protocol.
//!
//! Architecture: a pure state machine ([`state::MeshState`]) owns every
//! mutable structure (peer table, dedup set, key store, store-and-forward
//! queues, fragment reassembly) and reacts to [`event::MeshEvent`]s by
//! returning [`effect::Effect`]s. The tokio [`coordinator`] is a thin
//! orchestrator: it multiplexes transport events, commands, and timers
//! into the state machine and executes the effects it gets back. No other
//! code touches the state, so no locks guard the core invariants.
//!
//! Heavy payload encodes are shipped to `spawn_blocking` and return as
//! `CryptoDone` events; the state machine releases their transmissions in
//! submission order so signatures and nonces never race.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod coordinator;
pub mod dedup;
pub mod effect;
pub mod error;
pub mod event;
pub mod keystore;
pub mod peers;
pub mod state;
pub mod store_forward;
pub mod time;
pub mod transport;

pub use coordinator::{Command, MeshHandle};
pub use effect::Effect;
pub use error::{MeshError, Result};
pub use event::{ChatMessage, MeshEvent, NodeEvent, SendRequest, TimerKind};
pub use keystore::KeyStore;
pub use peers::{Peer, PeerTable};
pub use state::{MeshConfig, MeshState};
pub use store_forward::{MessageStore, RetentionClass, StoredMessage};
pub use transport::{ChannelTransport, Transport, TransportError, TransportEvent};
