//! Processing chain - engine, effect stages and the control hand-off
//!
//! - ProcessingChain: audio-thread side, owns engines and stages
//! - ChainController: control-thread side, clamps and publishes parameters
//! - ChainAtomics: metering shared between both
//! - Operating profiles deciding which stages run

mod atomics;
mod chain;
pub mod command;
mod controller;
mod params;
mod profile;

pub use atomics::ChainAtomics;
pub use chain::{ProcessingChain, INPUT_BACKLOG_BLOCKS};
pub use command::{command_channel, ChainCommand};
pub use controller::ChainController;
pub use params::{ChainParameters, EffectParameters, StretchParameters, MAX_RATE, MIN_RATE};
pub use profile::{OperatingProfile, AUDIOPHILE_CLARITY_AMOUNT, HARDWARE_PROTECTION_CEILING_DB};
