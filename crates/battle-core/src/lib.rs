//! Battle Core - real-time tempo/pitch and effects chain for sound-system battles
//!
//! Input PCM runs through an interchangeable time-stretch engine and then a
//! fixed chain of bass and dynamics stages, shaped by three operating
//! profiles (Battle Mode, Hardware Protection, Audiophile Mode).
//!
//! ```ignore
//! use battle_core::{ChainConfig, ProcessingChain};
//!
//! let (mut chain, mut controller) = ProcessingChain::new(ChainConfig::default());
//! chain.configure(48000, 2)?;
//!
//! // Control thread
//! controller.set_battle_mode(true);
//! controller.set_bass_boost(9.0);
//!
//! // Audio thread
//! let frames = chain.process(&input, &mut output);
//! ```

pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod timestretch;
pub mod types;

pub use config::ChainConfig;
pub use engine::{ChainAtomics, ChainController, ChainParameters, OperatingProfile, ProcessingChain};
pub use error::{ChainError, ChainResult};
pub use timestretch::{EngineDescriptor, EngineKind, EngineSelection, QualityTier};
pub use types::*;
