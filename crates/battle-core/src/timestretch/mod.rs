//! Time-stretch and pitch-shift back-ends
//!
//! Every back-end implements [`TimeStretchEngine`]: the caller pushes input
//! frames, then pulls whatever output is ready. Output count is not tied to
//! input count in a single call, so hosts poll until nothing more comes out.
//! Each engine's output queue has a fixed size; `input_room` tells the caller
//! how much input it can take before that queue would overflow.
//!
//! Back-ends, in fallback priority order:
//!
//! | kind | implementation | availability |
//! |------|----------------|--------------|
//! | `Premium`   | signalsmith-stretch, default preset | `signalsmith` feature, not disabled |
//! | `Balanced`  | signalsmith-stretch, cheaper preset | `signalsmith` feature, not disabled |
//! | `Reference` | two-pass linear interpolation       | always |
//!
//! The [`EngineRegistry`] owns one instance of each available back-end and
//! resolves requests for unavailable ones to the next kind down the list.

mod fifo;
mod reference;
mod registry;
#[cfg(feature = "signalsmith")]
mod signalsmith;

pub use fifo::FrameFifo;
pub use reference::ReferenceEngine;
pub use registry::{resolve_selection, EngineRegistry};
#[cfg(feature = "signalsmith")]
pub use signalsmith::SignalsmithEngine;

use serde::{Deserialize, Serialize};

use crate::error::ChainResult;
use crate::types::{Sample, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE};

/// Slowest supported tempo ratio
pub const MIN_TEMPO: f64 = 0.05;
/// Fastest supported tempo ratio
pub const MAX_TEMPO: f64 = 10.0;
/// Lowest pitch shift in semitones
pub const MIN_PITCH_SEMITONES: f64 = -36.0;
/// Highest pitch shift in semitones
pub const MAX_PITCH_SEMITONES: f64 = 36.0;

/// Lowest pitch ratio an engine accepts (rate mode at `MIN_TEMPO`)
pub const MIN_PITCH_RATIO: f64 = MIN_TEMPO;
/// Highest pitch ratio an engine accepts (rate mode at `MAX_TEMPO`)
pub const MAX_PITCH_RATIO: f64 = MAX_TEMPO;

/// Largest output/input length ratio (at `MIN_TEMPO`)
pub(crate) const MAX_EXPANSION: usize = 20;

/// Pitch ratio for a shift in semitones: `2^(semitones / 12)`
#[inline]
pub fn semitones_to_ratio(semitones: f64) -> f64 {
    (semitones / 12.0).exp2()
}

/// Semitone shift for a pitch ratio
#[inline]
pub fn ratio_to_semitones(ratio: f64) -> f64 {
    12.0 * ratio.max(f64::MIN_POSITIVE).log2()
}

/// Identifies one back-end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Premium,
    Balanced,
    Reference,
}

impl EngineKind {
    /// Fallback order: a request falls through to the kinds after it
    pub const PRIORITY: [EngineKind; 3] = [
        EngineKind::Premium,
        EngineKind::Balanced,
        EngineKind::Reference,
    ];

    /// Position in the priority list
    pub fn priority(&self) -> usize {
        match self {
            EngineKind::Premium => 0,
            EngineKind::Balanced => 1,
            EngineKind::Reference => 2,
        }
    }

    /// Convert from a priority index
    pub fn from_priority(index: u8) -> Option<Self> {
        Self::PRIORITY.get(index as usize).copied()
    }

    pub fn name(&self) -> &'static str {
        match self {
            EngineKind::Premium => "Premium",
            EngineKind::Balanced => "Balanced",
            EngineKind::Reference => "Reference",
        }
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Audio quality class of a back-end
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum QualityTier {
    /// Linear interpolation; audible artifacts at large shifts
    Basic,
    /// Phase-vocoder quality at reduced CPU cost
    Standard,
    /// Best available quality
    Studio,
}

/// Static description of a back-end
#[derive(Debug, Clone, PartialEq)]
pub struct EngineDescriptor {
    pub kind: EngineKind,
    pub tier: QualityTier,
    /// Built in and not disabled by configuration
    pub available: bool,
    pub tempo_range: (f64, f64),
    pub pitch_range_semitones: (f64, f64),
    pub sample_rate_range: (u32, u32),
    /// Honors `StretchSettings::formant_preservation`
    pub formant_preservation: bool,
}

impl EngineDescriptor {
    /// Descriptor with the full required ranges
    pub fn new(kind: EngineKind, tier: QualityTier, available: bool) -> Self {
        Self {
            kind,
            tier,
            available,
            tempo_range: (MIN_TEMPO, MAX_TEMPO),
            pitch_range_semitones: (MIN_PITCH_SEMITONES, MAX_PITCH_SEMITONES),
            sample_rate_range: (MIN_SAMPLE_RATE, MAX_SAMPLE_RATE),
            formant_preservation: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn supports_sample_rate(&self, sample_rate: u32) -> bool {
        (self.sample_rate_range.0..=self.sample_rate_range.1).contains(&sample_rate)
    }
}

/// Requested back-end and the one actually running
///
/// Only an explicit selection changes this; parameter updates never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSelection {
    pub requested: EngineKind,
    pub active: EngineKind,
}

impl EngineSelection {
    /// Whether the request had to fall back to another engine
    pub fn is_fallback(&self) -> bool {
        self.requested != self.active
    }
}

/// Effective transform handed to the back-ends
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StretchSettings {
    /// Playback speed; output length is `input / tempo`
    pub tempo: f64,
    /// Frequency multiplier
    pub pitch_ratio: f64,
    /// Keep the spectral envelope in place while transposing
    pub formant_preservation: bool,
}

impl StretchSettings {
    /// Settings with formant preservation on
    pub fn new(tempo: f64, pitch_ratio: f64) -> Self {
        Self {
            tempo,
            pitch_ratio,
            formant_preservation: true,
        }
    }

    /// Clamp both ratios into the supported ranges
    ///
    /// The pitch ratio may span the whole tempo range so rate mode can move
    /// tempo and pitch together at the extremes; explicit pitch shifts are
    /// limited to ±36 semitones before they get here.
    pub fn clamped(self) -> Self {
        let tempo = if self.tempo.is_finite() { self.tempo } else { 1.0 };
        let pitch = if self.pitch_ratio.is_finite() && self.pitch_ratio > 0.0 {
            self.pitch_ratio
        } else {
            1.0
        };
        Self {
            tempo: tempo.clamp(MIN_TEMPO, MAX_TEMPO),
            pitch_ratio: pitch.clamp(MIN_PITCH_RATIO, MAX_PITCH_RATIO),
            formant_preservation: self.formant_preservation,
        }
    }
}

impl Default for StretchSettings {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

/// Input frames whose output is guaranteed to fit in `free_frames`
///
/// A push of `n` frames yields at most `n / tempo + 1` output frames in every
/// back-end; one more frame of slack covers rounding.
pub(crate) fn input_room_for(free_frames: usize, tempo: f64) -> usize {
    (free_frames.saturating_sub(2) as f64 * tempo).floor() as usize
}

/// Contract shared by every time-stretch back-end
///
/// All methods except `configure` run on the audio thread and must not
/// allocate or block. `configure` sizes every buffer for `max_block_frames`
/// input frames per push.
pub trait TimeStretchEngine: Send {
    fn descriptor(&self) -> &EngineDescriptor;

    /// Allocate buffers for a stream format; resets all state
    fn configure(
        &mut self,
        sample_rate: u32,
        channels: usize,
        max_block_frames: usize,
    ) -> ChainResult<()>;

    /// Apply new tempo/pitch ratios; takes effect for subsequently pushed input
    fn set_settings(&mut self, settings: StretchSettings);

    /// Settings in effect, after clamping
    fn settings(&self) -> StretchSettings;

    /// Feed interleaved input frames
    ///
    /// Output that does not fit the output queue is dropped; callers keep
    /// pushes within [`input_room`](Self::input_room).
    fn push(&mut self, input: &[Sample]);

    /// Input frames that can be pushed now without overflowing the output queue
    fn input_room(&self) -> usize;

    /// Whether the output queue has space for everything `flush` emits
    fn can_flush(&self) -> bool;

    /// Move up to `output.len() / channels` ready frames into `output`
    ///
    /// Returns the number of frames written.
    fn pull(&mut self, output: &mut [Sample]) -> usize;

    /// Frames ready to pull
    fn available_frames(&self) -> usize;

    /// Force buffered partial input out to the output queue (end of stream)
    fn flush(&mut self);

    /// Drop all buffered audio and internal history without deallocating
    fn clear(&mut self);

    /// Processing delay in output frames
    fn latency_frames(&self) -> usize;

    /// Output frames discarded because the output queue was full
    fn dropped_frames(&self) -> u64;
}
