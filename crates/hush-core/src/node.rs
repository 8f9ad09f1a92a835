//! The node facade.
//!
//! [`Node`] ties a mesh engine to a transport driver and enforces the
//! status state machine:
//!
//! ```text
//! Stopped ──► Initializing ──► Running ──► Stopped
//!                  │               │
//!                  └────► Error ◄──┘
//!                           │
//!                           └────► Stopped
//! ```

use std::fmt;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tracing::{debug, info, warn};

use hush_crypto::SessionIdentity;
use hush_mesh::{
    MeshHandle, MeshState, NodeEvent, SendRequest, Transport, TransportEvent,
};
use hush_protocol::PeerId;

use crate::config::{NodeConfig, MAX_CHANNEL_NAME_LEN};
use crate::error::{NodeError, Result};

/// Capacity of the driver event channel.
const DRIVER_CHANNEL_SIZE: usize = 256;

/// Facade lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeStatus {
    /// Not running; the idle and terminal state.
    Stopped,
    /// `start` is generating keys and spawning the engine.
    Initializing,
    /// The engine is live.
    Running,
    /// A fatal, unrecoverable condition; only `stop` leaves this state.
    Error,
}

impl NodeStatus {
    /// Whether the status machine permits moving to `to`.
    pub fn can_transition(self, to: NodeStatus) -> bool {
        use NodeStatus::*;
        matches!(
            (self, to),
            (Stopped, Initializing)
                | (Initializing, Running)
                | (Initializing, Error)
                | (Running, Stopped)
                | (Running, Error)
                | (Error, Stopped)
        )
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Stopped => "stopped",
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Error => "error",
        };
        write!(f, "{name}")
    }
}

/// Live engine state, present only while running.
struct Running {
    handle: MeshHandle,
    driver_tx: mpsc::Sender<TransportEvent>,
    peer_id: PeerId,
}

/// A HUSH mesh chat node.
///
/// Thread-safe; share it behind an `Arc`. Each value owns its own keys,
/// peer table, and engine, so tests and multi-identity apps construct as
/// many as they need.
pub struct Node {
    config: NodeConfig,
    transport: Arc<dyn Transport>,
    status_tx: watch::Sender<NodeStatus>,
    running: RwLock<Option<Running>>,
}

impl Node {
    /// Create a node over a transport driver. This is `init()`: cheap,
    /// no keys are generated yet.
    pub fn new(config: NodeConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| NodeError::InvalidConfig(e.to_string()))?;

        let (status_tx, _) = watch::channel(NodeStatus::Stopped);
        Ok(Self {
            config,
            transport,
            status_tx,
            running: RwLock::new(None),
        })
    }

    /// Start the session: generate fresh session keys, spawn the engine,
    /// and return the channel the driver feeds transport events into.
    ///
    /// `peer_id` must be exactly 8 UTF-8 bytes (the advertised local
    /// name). The nickname defaults to the peer id.
    pub async fn start(
        &self,
        peer_id: &str,
        nickname: Option<&str>,
    ) -> Result<mpsc::Sender<TransportEvent>> {
        let peer_id = parse_peer_id(peer_id)?;

        self.transition(NodeStatus::Stopped, NodeStatus::Initializing)
            .map_err(|_| NodeError::AlreadyRunning)?;

        let nickname = match nickname {
            Some(nickname) => nickname.to_string(),
            None => peer_id.display(),
        };
        let identity = SessionIdentity::generate();
        let state = MeshState::new(peer_id, nickname, identity, self.config.mesh_config());

        let (driver_tx, driver_rx) = mpsc::channel(DRIVER_CHANNEL_SIZE);
        let handle = MeshHandle::spawn(state, Arc::clone(&self.transport), driver_rx);

        *self.running.write().await = Some(Running {
            handle,
            driver_tx: driver_tx.clone(),
            peer_id,
        });

        self.transition(NodeStatus::Initializing, NodeStatus::Running)
            .expect("initializing -> running is always legal");
        info!(%peer_id, "node started");
        Ok(driver_tx)
    }

    /// Stop the session: LEAVE is broadcast, keys and tables are wiped.
    pub async fn stop(&self) -> Result<()> {
        let current = *self.status_tx.borrow();
        if !current.can_transition(NodeStatus::Stopped) {
            return Err(NodeError::NotRunning);
        }

        if let Some(running) = self.running.write().await.take() {
            running.handle.shutdown().await;
        }
        self.status_tx.send_replace(NodeStatus::Stopped);
        info!("node stopped");
        Ok(())
    }

    /// Broadcast plaintext to the whole mesh.
    pub async fn send_broadcast(&self, text: &str) -> Result<()> {
        self.send(SendRequest::Broadcast { content: text.to_string() })
            .await
    }

    /// Send an end-to-end encrypted message to one peer.
    ///
    /// Fails with [`NodeError::EncryptionFailed`] when no session key
    /// exists yet; the handshake is initiated so a retry can succeed.
    pub async fn send_private(&self, peer_id: &str, text: &str) -> Result<()> {
        let to = parse_peer_id(peer_id)?;
        self.send(SendRequest::Private { to, content: text.to_string() })
            .await
    }

    /// Send into a named channel.
    pub async fn send_channel(&self, channel: &str, text: &str) -> Result<()> {
        let name = validate_channel(channel)?;
        self.send(SendRequest::Channel { name, content: text.to_string() })
            .await
    }

    /// Join a channel and announce the membership.
    pub async fn join_channel(&self, channel: &str) -> Result<()> {
        let name = validate_channel(channel)?;
        self.send(SendRequest::JoinChannel { name }).await
    }

    /// Leave a channel and announce the departure.
    pub async fn leave_channel(&self, channel: &str) -> Result<()> {
        let name = validate_channel(channel)?;
        self.send(SendRequest::LeaveChannel { name }).await
    }

    /// Mark a peer as favorite; its store-and-forward traffic moves to
    /// the long-retention class.
    pub async fn set_favorite(&self, peer_id: &str, favorite: bool) -> Result<()> {
        let peer = parse_peer_id(peer_id)?;
        self.send(SendRequest::SetFavorite { peer, favorite }).await
    }

    /// Subscribe to the incoming-message / peer / log event stream.
    pub async fn subscribe(&self) -> Result<broadcast::Receiver<NodeEvent>> {
        match self.running.read().await.as_ref() {
            Some(running) => Ok(running.handle.subscribe()),
            None => Err(NodeError::NotInitialized),
        }
    }

    /// Watch status transitions.
    pub fn status(&self) -> watch::Receiver<NodeStatus> {
        self.status_tx.subscribe()
    }

    /// The current status.
    pub fn current_status(&self) -> NodeStatus {
        *self.status_tx.borrow()
    }

    /// The running session's peer id.
    pub async fn peer_id(&self) -> Option<PeerId> {
        self.running.read().await.as_ref().map(|r| r.peer_id)
    }

    /// The driver event channel of the running session.
    pub async fn driver_events(&self) -> Result<mpsc::Sender<TransportEvent>> {
        match self.running.read().await.as_ref() {
            Some(running) => Ok(running.driver_tx.clone()),
            None => Err(NodeError::NotInitialized),
        }
    }

    async fn send(&self, request: SendRequest) -> Result<()> {
        if self.current_status() != NodeStatus::Running {
            return Err(NodeError::NotRunning);
        }
        let guard = self.running.read().await;
        let running = guard.as_ref().ok_or(NodeError::NotRunning)?;
        match running.handle.send(request).await {
            Ok(()) => Ok(()),
            Err(e) => {
                debug!(error = %e, "send failed");
                Err(e.into())
            }
        }
    }

    fn transition(&self, from: NodeStatus, to: NodeStatus) -> Result<()> {
        let mut ok = false;
        self.status_tx.send_if_modified(|status| {
            if *status == from && status.can_transition(to) {
                *status = to;
                ok = true;
                true
            } else {
                false
            }
        });
        if ok {
            Ok(())
        } else {
            warn!(?from, ?to, "illegal status transition refused");
            Err(NodeError::NotRunning)
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("status", &self.current_status())
            .field("mtu", &self.config.mtu)
            .finish()
    }
}

fn parse_peer_id(s: &str) -> Result<PeerId> {
    if s.len() != 8 {
        return Err(NodeError::InvalidPeer(format!(
            "expected 8 bytes, got {}",
            s.len()
        )));
    }
    PeerId::parse(s).ok_or_else(|| NodeError::InvalidPeer(s.to_string()))
}

fn validate_channel(name: &str) -> Result<String> {
    if name.is_empty() || name.len() > MAX_CHANNEL_NAME_LEN {
        return Err(NodeError::InvalidChannel(format!(
            "length must be 1..={MAX_CHANNEL_NAME_LEN} bytes"
        )));
    }
    Ok(name.to_string())
}
