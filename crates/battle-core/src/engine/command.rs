//! Lock-free command queue from the control thread to the audio thread
//!
//! The controller never touches chain state directly. It mirrors the
//! parameters locally and pushes a full snapshot into an `rtrb` ring buffer
//! whenever something changed; the chain drains the queue at the start of
//! every process call.
//!
//! # Real-Time Safety
//!
//! - **No allocations**: the ring buffer and every command are fixed size
//! - **Wait-free**: push and pop are O(1) and never block
//! - **Last snapshot wins**: the audio thread applies only the newest
//!   parameter snapshot it finds, so a burst of slider moves costs one update
//!
//! # Usage
//!
//! ```ignore
//! let (tx, rx) = command_channel(1024);
//!
//! // Control thread
//! tx.push(ChainCommand::UpdateParameters(params))?;
//!
//! // Audio thread
//! while let Ok(cmd) = rx.pop() { /* apply */ }
//! ```

use super::params::ChainParameters;
use crate::timestretch::EngineSelection;

/// Default number of queued commands
pub const DEFAULT_COMMAND_QUEUE_CAPACITY: usize = 1024;

/// Commands sent from the control thread to the audio thread
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChainCommand {
    // ─────────────────────────────────────────────────────────────
    // Parameters
    // ─────────────────────────────────────────────────────────────
    /// Replace every effect, tempo/pitch and profile setting
    UpdateParameters(ChainParameters),

    // ─────────────────────────────────────────────────────────────
    // Engine
    // ─────────────────────────────────────────────────────────────
    /// Switch to an already resolved engine; clears every engine's buffers
    SelectEngine(EngineSelection),

    /// Drop buffered audio and reset stage state
    Clear,
}

/// Create a command channel
///
/// Returns `(Producer, Consumer)`: the producer belongs to the controller,
/// the consumer to the chain.
pub fn command_channel(
    capacity: usize,
) -> (rtrb::Producer<ChainCommand>, rtrb::Consumer<ChainCommand>) {
    rtrb::RingBuffer::new(capacity.max(1))
}
