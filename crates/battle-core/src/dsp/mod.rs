//! Effect stages of the battle chain
//!
//! Every stage processes interleaved samples in place with per-channel state
//! sized for [`MAX_CHANNELS`]. Stages are configured once per stream format and
//! never allocate while processing.
//!
//! Signal order (see `engine::chain`):
//!
//! ```text
//! engine → bass boost → sub-harmonic → exciter → clarity
//!        → rumble/DC → compressor → dither → limiter
//! ```

pub mod biquad;
pub mod compressor;
pub mod enhance;
pub mod envelope;
pub mod exciter;
pub mod limiter;
pub mod protection;
pub mod sub_harmonic;

pub use biquad::{BassBoost, BiquadCoefficients, BiquadFilter};
pub use compressor::PunchCompressor;
pub use enhance::{ClarityEnhancer, Dither};
pub use envelope::EnvelopeFollower;
pub use exciter::HarmonicExciter;
pub use limiter::TruePeakLimiter;
pub use protection::{DcBlocker, RumbleFilter};
pub use sub_harmonic::SubHarmonicSynth;

use crate::types::{Sample, MAX_CHANNELS};

/// A fixed-position stage of the effects chain
///
/// Implementors must be real-time safe: `process` runs on the audio thread
/// and may not allocate, lock, or block.
pub trait Stage: Send {
    /// Adopt a new stream format and reset all state to silence
    fn configure(&mut self, sample_rate: u32, channels: usize);

    /// Process interleaved samples in place
    fn process(&mut self, samples: &mut [Sample]);

    /// Reset filter/envelope state to silence without reallocating
    fn reset(&mut self);
}

/// Smoothing coefficient for a time constant given in milliseconds
///
/// `1 - e^(-1 / (ms * sr / 1000))`. A zero or negative time gives an
/// instantaneous (1.0) coefficient.
#[inline]
pub fn time_coefficient(ms: f32, sample_rate: u32) -> f32 {
    let samples = ms * sample_rate as f32 / 1000.0;
    if samples <= 0.0 {
        1.0
    } else {
        1.0 - (-1.0 / samples).exp()
    }
}

/// One-pole low-pass coefficient for a corner frequency
///
/// `1 - e^(-2π f / sr)`
#[inline]
pub fn corner_coefficient(frequency_hz: f32, sample_rate: u32) -> f32 {
    1.0 - (-2.0 * std::f32::consts::PI * frequency_hz / sample_rate.max(1) as f32).exp()
}

/// Clamp a channel count to the supported range
#[inline]
pub(crate) fn clamp_channels(channels: usize) -> usize {
    channels.clamp(1, MAX_CHANNELS)
}
