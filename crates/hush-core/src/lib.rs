//! # hush-core
//!
//! The public facade of the HUSH mesh chat node.
//!
//! A [`Node`] owns one mesh engine and exposes the application surface:
//! lifecycle (`start` / `stop`), the send operations, channel membership,
//! and the event and status streams. Applications construct independent
//! `Node` values (there are no process-wide singletons) and plug in a
//! transport driver implementing [`hush_mesh::Transport`].
//!
//! ```ignore
//! use std::sync::Arc;
//! use hush_core::{Node, NodeConfig};
//!
//! let node = Node::new(NodeConfig::default(), transport)?;
//! let driver = node.start("AAAAAAAA", Some("Alice")).await?;
//! // feed driver with TransportEvents from the BLE stack ...
//! node.send_broadcast("hello mesh").await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod node;

pub use config::{ConfigError, NodeConfig};
pub use error::{NodeError, Result};
pub use node::{Node, NodeStatus};

pub use hush_mesh::{ChatMessage, NodeEvent, Transport, TransportError, TransportEvent};
pub use hush_protocol::PeerId;
