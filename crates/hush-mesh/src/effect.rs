//! Effects produced by the state machine.
//!
//! Every `handle_*` / `tick_*` method on [`crate::state::MeshState`]
//! returns `Vec<Effect>`. The coordinator is the only place that executes
//! them; the state machine itself never touches a socket, a channel, or a
//! worker pool.

use hush_protocol::PeerId;

use crate::event::NodeEvent;

/// An intention the coordinator executes on the state machine's behalf.
#[derive(Debug)]
pub enum Effect {
    /// Hand bytes to the transport. `to: None` broadcasts to every
    /// connected neighbor.
    Transmit {
        /// Target link, or broadcast when absent.
        to: Option<PeerId>,
        /// Encoded packet bytes.
        bytes: Vec<u8>,
    },
    /// Surface an event to the application.
    Emit(NodeEvent),
    /// Offload payload-section preparation (compression decision and
    /// DEFLATE) to a blocking worker. The result comes back as a
    /// `CryptoDone` event with this job id.
    PrepareAsync {
        /// Job id to echo back.
        job_id: u64,
        /// Logical payload to prepare.
        payload: Vec<u8>,
    },
}
