//! Chain configuration error types

use thiserror::Error;

/// Errors surfaced by `ProcessingChain::configure`
///
/// Nothing on the audio path returns these; once configured the chain
/// only ever clamps or produces fewer frames.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    /// Sample rate outside what the chain can process
    #[error("Unsupported sample rate {sample_rate}Hz (supported: {min}-{max}Hz)")]
    UnsupportedSampleRate { sample_rate: u32, min: u32, max: u32 },

    /// Channel count other than mono or stereo
    #[error("Unsupported channel count: {0} (supported: 1 or 2)")]
    UnsupportedChannelCount(usize),

    /// An available back-end cannot run at the requested sample rate
    #[error("Engine '{engine}' does not support {sample_rate}Hz")]
    EngineSampleRate {
        engine: &'static str,
        sample_rate: u32,
    },

    /// A back-end failed to initialize
    #[error("Engine '{engine}' failed to initialize: {reason}")]
    EngineInit {
        engine: &'static str,
        reason: String,
    },
}

/// Result type for chain configuration
pub type ChainResult<T> = Result<T, ChainError>;
