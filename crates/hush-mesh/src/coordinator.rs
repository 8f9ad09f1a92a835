//! The coordinator event loop, a thin orchestrator.
//!
//! Owns the [`MeshState`] and multiplexes transport events, application
//! commands, worker completions, and timers into it with `tokio::select!`.
//! All protocol logic lives in the state machine; this loop only routes
//! events in and executes the returned effects.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use hush_protocol::limits::{ANNOUNCE_INTERVAL, GC_INTERVAL};
use hush_protocol::{prepare_section, PeerId, PreparedPayload};

use crate::effect::Effect;
use crate::error::MeshError;
use crate::event::{MeshEvent, NodeEvent, SendRequest, TimerKind};
use crate::state::MeshState;
use crate::store_forward::StoredMessage;
use crate::time::now_ms;
use crate::transport::{Transport, TransportEvent};

/// Capacity of the upstream event broadcast.
const EVENT_CHANNEL_SIZE: usize = 1024;

/// Capacity of the command channel.
const COMMAND_CHANNEL_SIZE: usize = 64;

/// Commands the application posts to the loop.
#[derive(Debug)]
pub enum Command {
    /// An application send; the outcome goes back on `reply`.
    Send {
        /// The request.
        request: SendRequest,
        /// Caller-facing outcome.
        reply: oneshot::Sender<Result<(), MeshError>>,
    },
    /// Park a message for an absent peer (store-and-forward).
    Park {
        /// The absent peer.
        peer: PeerId,
        /// The message to hold.
        message: StoredMessage,
    },
    /// Stop the loop: broadcast LEAVE, wipe state, exit.
    Shutdown,
}

/// Handle to a running mesh engine.
pub struct MeshHandle {
    cmd_tx: mpsc::Sender<Command>,
    event_tx: broadcast::Sender<NodeEvent>,
    task: JoinHandle<()>,
}

impl MeshHandle {
    /// Spawn the coordinator for `state` over `transport`.
    ///
    /// `transport_rx` is the driver's event feed.
    pub fn spawn(
        state: MeshState,
        transport: Arc<dyn Transport>,
        transport_rx: mpsc::Receiver<TransportEvent>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        let task = tokio::spawn(run_loop(
            state,
            transport,
            transport_rx,
            cmd_rx,
            event_tx.clone(),
        ));

        Self { cmd_tx, event_tx, task }
    }

    /// Subscribe to the upstream event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.event_tx.subscribe()
    }

    /// Post a send request and await its outcome.
    pub async fn send(&self, request: SendRequest) -> Result<(), MeshError> {
        let (reply, outcome) = oneshot::channel();
        self.cmd_tx
            .send(Command::Send { request, reply })
            .await
            .map_err(|_| MeshError::NotRunning)?;
        outcome.await.map_err(|_| MeshError::NotRunning)?
    }

    /// Park a message for an absent peer.
    pub async fn park(&self, peer: PeerId, message: StoredMessage) -> Result<(), MeshError> {
        self.cmd_tx
            .send(Command::Park { peer, message })
            .await
            .map_err(|_| MeshError::NotRunning)
    }

    /// Stop the engine: LEAVE is broadcast, state is wiped, the loop
    /// exits. Waits for the loop to finish.
    pub async fn shutdown(self) {
        let _ = self.cmd_tx.send(Command::Shutdown).await;
        let _ = self.task.await;
    }

    /// Whether the loop is still alive.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

async fn run_loop(
    mut state: MeshState,
    transport: Arc<dyn Transport>,
    mut transport_rx: mpsc::Receiver<TransportEvent>,
    mut cmd_rx: mpsc::Receiver<Command>,
    event_tx: broadcast::Sender<NodeEvent>,
) {
    // First announce fires immediately on start.
    let mut announce = tokio::time::interval(ANNOUNCE_INTERVAL);
    let mut gc = tokio::time::interval(GC_INTERVAL);
    gc.tick().await;

    let (crypto_tx, mut crypto_rx) =
        mpsc::unbounded_channel::<(u64, Result<PreparedPayload, MeshError>)>();

    info!(peer = %state.local_id(), "mesh engine running");

    loop {
        let effects = tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Send { request, reply }) => {
                    let (effects, outcome) = state.handle_send(request, now_ms());
                    let _ = reply.send(outcome);
                    effects
                }
                Some(Command::Park { peer, message }) => {
                    state.park(peer, message);
                    Vec::new()
                }
                Some(Command::Shutdown) | None => break,
            },

            event = transport_rx.recv() => match event {
                Some(TransportEvent::Bytes { from, bytes }) => {
                    state.handle_event(MeshEvent::IncomingBytes { from, bytes }, now_ms())
                }
                Some(TransportEvent::PeerSeen { peer, digest }) => {
                    state.handle_event(MeshEvent::PeerSeen { peer, digest }, now_ms())
                }
                Some(TransportEvent::PeerLost { peer }) => {
                    state.handle_event(MeshEvent::PeerLost { peer }, now_ms())
                }
                None => break,
            },

            Some((job_id, result)) = crypto_rx.recv() => {
                state.handle_event(MeshEvent::CryptoDone { job_id, result }, now_ms())
            }

            _ = announce.tick() => state.handle_event(MeshEvent::Timer(TimerKind::Announce), now_ms()),

            _ = gc.tick() => state.handle_event(MeshEvent::Timer(TimerKind::Gc), now_ms()),
        };

        execute_effects(effects, transport.as_ref(), &event_tx, &crypto_tx).await;
    }

    // Graceful exit: say goodbye, then wipe the session.
    let effects = state.leave(now_ms());
    execute_effects(effects, transport.as_ref(), &event_tx, &crypto_tx).await;
    state.clear();
    debug!("mesh engine stopped");
}

/// Execute effects; the only place that touches I/O.
async fn execute_effects(
    effects: Vec<Effect>,
    transport: &dyn Transport,
    event_tx: &broadcast::Sender<NodeEvent>,
    crypto_tx: &mpsc::UnboundedSender<(u64, Result<PreparedPayload, MeshError>)>,
) {
    for effect in effects {
        match effect {
            Effect::Transmit { to, bytes } => {
                if let Err(e) = transport.deliver(to, &bytes).await {
                    warn!(error = %e, "transport write failed");
                    let _ = event_tx.send(NodeEvent::Log {
                        line: format!("transport write failed: {e}"),
                    });
                }
            }
            Effect::Emit(event) => {
                // No subscribers is fine; the engine never blocks on the
                // application draining its events.
                let _ = event_tx.send(event);
            }
            Effect::PrepareAsync { job_id, payload } => {
                let crypto_tx = crypto_tx.clone();
                tokio::task::spawn_blocking(move || {
                    let prepared = prepare_section(&payload);
                    let _ = crypto_tx.send((job_id, Ok(prepared)));
                });
            }
        }
    }
}
