//! Octave-below sub-harmonic synthesis
//!
//! The bass band is isolated with a one-pole low-pass, and a square
//! oscillator flips on every rising zero crossing of that band, so it runs at
//! half the bass frequency. The smoothed square is scaled by the instantaneous
//! bass magnitude and mixed on top of the dry signal.
//!
//! Flipping on crossings in both directions would toggle twice per bass cycle
//! and leave the square at the bass frequency itself. Only rising crossings
//! count here, which is what puts the square an octave below.

use super::{clamp_channels, corner_coefficient, Stage};
use crate::types::{Sample, DEFAULT_SAMPLE_RATE, MAX_CHANNELS};

/// Corner of the bass-isolation low-pass
const BASS_CORNER_HZ: f32 = 80.0;
/// One-pole coefficient that rounds off the square wave edges
const SQUARE_SMOOTHING: f32 = 0.01;

/// Per-channel synthesis state
#[derive(Debug, Clone, Copy, Default)]
struct SubVoice {
    bass: f32,
    was_positive: bool,
    square_high: bool,
    square: f32,
}

impl SubVoice {
    #[inline]
    fn tick(&mut self, x: Sample, lp_coeff: f32, amount: f32) -> Sample {
        self.bass += lp_coeff * (x - self.bass);

        let positive = self.bass > 0.0;
        if positive && !self.was_positive {
            self.square_high = !self.square_high;
        }
        self.was_positive = positive;

        let target = if self.square_high { 1.0 } else { -1.0 };
        self.square += SQUARE_SMOOTHING * (target - self.square);

        x + self.square * self.bass.abs() * amount
    }
}

/// Sub-harmonic generator stage
pub struct SubHarmonicSynth {
    voices: [SubVoice; MAX_CHANNELS],
    channels: usize,
    lp_coeff: f32,
    amount: f32,
}

impl SubHarmonicSynth {
    pub fn new() -> Self {
        Self {
            voices: [SubVoice::default(); MAX_CHANNELS],
            channels: MAX_CHANNELS,
            lp_coeff: corner_coefficient(BASS_CORNER_HZ, DEFAULT_SAMPLE_RATE),
            amount: 0.0,
        }
    }

    /// Mix amount, clamped to 0-1
    pub fn set_amount(&mut self, amount: f32) {
        if amount.is_finite() {
            self.amount = amount.clamp(0.0, 1.0);
        }
    }

    pub fn amount(&self) -> f32 {
        self.amount
    }

    pub fn is_active(&self) -> bool {
        self.amount > 0.0
    }
}

impl Default for SubHarmonicSynth {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for SubHarmonicSynth {
    fn configure(&mut self, sample_rate: u32, channels: usize) {
        self.channels = clamp_channels(channels);
        self.lp_coeff = corner_coefficient(BASS_CORNER_HZ, sample_rate);
        self.reset();
    }

    fn process(&mut self, samples: &mut [Sample]) {
        let (lp_coeff, amount) = (self.lp_coeff, self.amount);
        for frame in samples.chunks_exact_mut(self.channels) {
            for (voice, sample) in self.voices.iter_mut().zip(frame.iter_mut()) {
                *sample = voice.tick(*sample, lp_coeff, amount);
            }
        }
    }

    fn reset(&mut self) {
        self.voices = [SubVoice::default(); MAX_CHANNELS];
    }
}
