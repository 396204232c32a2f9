//! Bass-band harmonic exciter
//!
//! Isolates a narrow low band (one-pole low-pass at 90Hz followed by a
//! one-pole high-pass at 40Hz), soft-saturates it and adds only the
//! difference between the saturated and the clean band. The dry signal is
//! never attenuated, so the stage can add harmonics but not remove bass.

use super::{clamp_channels, corner_coefficient, Stage};
use crate::types::{Sample, DEFAULT_SAMPLE_RATE, MAX_CHANNELS};

const LOW_PASS_HZ: f32 = 90.0;
const HIGH_PASS_HZ: f32 = 40.0;
/// Saturation drive: `tanh(x * DRIVE) / DRIVE`
const DRIVE: f32 = 3.0;

#[derive(Debug, Clone, Copy, Default)]
struct ExciterVoice {
    low: f32,
    floor: f32,
}

/// Harmonic exciter stage
pub struct HarmonicExciter {
    voices: [ExciterVoice; MAX_CHANNELS],
    channels: usize,
    lp_coeff: f32,
    hp_coeff: f32,
    amount: f32,
}

impl HarmonicExciter {
    pub fn new() -> Self {
        Self {
            voices: [ExciterVoice::default(); MAX_CHANNELS],
            channels: MAX_CHANNELS,
            lp_coeff: corner_coefficient(LOW_PASS_HZ, DEFAULT_SAMPLE_RATE),
            hp_coeff: corner_coefficient(HIGH_PASS_HZ, DEFAULT_SAMPLE_RATE),
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

    /// Soft saturation curve
    #[inline]
    fn saturate(x: f32) -> f32 {
        (x * DRIVE).tanh() / DRIVE
    }
}

impl Default for HarmonicExciter {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for HarmonicExciter {
    fn configure(&mut self, sample_rate: u32, channels: usize) {
        self.channels = clamp_channels(channels);
        self.lp_coeff = corner_coefficient(LOW_PASS_HZ, sample_rate);
        self.hp_coeff = corner_coefficient(HIGH_PASS_HZ, sample_rate);
        self.reset();
    }

    fn process(&mut self, samples: &mut [Sample]) {
        let (lp, hp, amount) = (self.lp_coeff, self.hp_coeff, self.amount);
        for frame in samples.chunks_exact_mut(self.channels) {
            for (voice, sample) in self.voices.iter_mut().zip(frame.iter_mut()) {
                let x = *sample;
                voice.low += lp * (x - voice.low);
                voice.floor += hp * (voice.low - voice.floor);
                let band = voice.low - voice.floor;
                *sample = x + (Self::saturate(band) - band) * amount;
            }
        }
    }

    fn reset(&mut self) {
        self.voices = [ExciterVoice::default(); MAX_CHANNELS];
    }
}
