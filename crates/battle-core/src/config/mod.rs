//! Chain configuration
//!
//! `ChainConfig` is what a host stores on disk: the stream format to open,
//! engine preferences, and the parameter set to start from. Every field has a
//! default, so a partial YAML file is valid.
//!
//! ```ignore
//! use battle_core::config::{load_chain_config, save_config};
//!
//! let config = load_chain_config(&path);
//! let (mut chain, controller) = ProcessingChain::new(config);
//! chain.configure(config.sample_rate, config.channels)?;
//! ```

mod io;

pub use io::{load_config, save_config};

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dsp::enhance::{DEFAULT_DITHER_BITS, DITHER_BITS_RANGE};
use crate::engine::command::DEFAULT_COMMAND_QUEUE_CAPACITY;
use crate::engine::ChainParameters;
use crate::timestretch::EngineKind;
use crate::types::{StreamFormat, DEFAULT_MAX_BLOCK_FRAMES, DEFAULT_SAMPLE_RATE, MAX_CHANNELS};

/// Largest accepted `max_block_frames`
pub const MAX_BLOCK_FRAMES_LIMIT: usize = 1 << 16;

/// Startup configuration of one processing chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Stream sample rate in Hz
    /// Default: 44100
    pub sample_rate: u32,

    /// 1 (mono) or 2 (stereo)
    /// Default: 2
    pub channels: usize,

    /// Largest block handed to an engine in one push
    /// All buffers are sized from this at configure time; a `process` call
    /// may pass up to `INPUT_BACKLOG_BLOCKS` times as many frames.
    /// Default: 8192
    pub max_block_frames: usize,

    /// Commands the controller can queue before the audio thread drains them
    /// Default: 1024
    pub command_queue_capacity: usize,

    /// Engine requested at startup
    /// Default: premium (falls back if unavailable)
    pub preferred_engine: EngineKind,

    /// Engines treated as unavailable, e.g. for licensing reasons
    pub disabled_engines: Vec<EngineKind>,

    /// Audiophile-mode dither target bit depth (8-24)
    /// Default: 16
    pub dither_bits: u32,

    /// Parameters the chain starts with
    pub parameters: ChainParameters,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: MAX_CHANNELS,
            max_block_frames: DEFAULT_MAX_BLOCK_FRAMES,
            command_queue_capacity: DEFAULT_COMMAND_QUEUE_CAPACITY,
            preferred_engine: EngineKind::Premium,
            disabled_engines: Vec::new(),
            dither_bits: DEFAULT_DITHER_BITS,
            parameters: ChainParameters::default(),
        }
    }
}

impl ChainConfig {
    /// Clamp sizes and parameters into range
    ///
    /// Sample rate and channel count are left alone: invalid values are
    /// reported by `ProcessingChain::configure` instead of silently changed.
    pub fn sanitized(&self) -> Self {
        Self {
            sample_rate: self.sample_rate,
            channels: self.channels,
            max_block_frames: self.max_block_frames.clamp(1, MAX_BLOCK_FRAMES_LIMIT),
            command_queue_capacity: self.command_queue_capacity.max(1),
            preferred_engine: self.preferred_engine,
            disabled_engines: self.disabled_engines.clone(),
            dither_bits: self.dither_bits.clamp(DITHER_BITS_RANGE.0, DITHER_BITS_RANGE.1),
            parameters: self.parameters.sanitized(),
        }
    }

    pub fn format(&self) -> StreamFormat {
        StreamFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }
}

/// Load a `ChainConfig` and sanitize it
pub fn load_chain_config(path: &Path) -> ChainConfig {
    load_config::<ChainConfig>(path).sanitized()
}
