//! Audiophile-mode stages: presence clarity and output dither

use super::{clamp_channels, BiquadCoefficients, BiquadFilter, Stage};
use crate::types::{Sample, DEFAULT_SAMPLE_RATE};

// ═══════════════════════════════════════════════════════════════════════════════
// Clarity
// ═══════════════════════════════════════════════════════════════════════════════

/// Centre of the presence band
const PRESENCE_HZ: f64 = 3000.0;
const PRESENCE_Q: f64 = 0.7;
/// Boost at amount 1.0
const MAX_PRESENCE_DB: f64 = 6.0;

/// Gentle presence-band peaking boost
///
/// Deliberately separate from the bass shelf: it only lifts the 3kHz region
/// by `amount * 6dB`.
pub struct ClarityEnhancer {
    filter: BiquadFilter,
    amount: f32,
    sample_rate: u32,
}

impl ClarityEnhancer {
    pub fn new(amount: f32) -> Self {
        let mut enhancer = Self {
            filter: BiquadFilter::default(),
            amount: amount.clamp(0.0, 1.0),
            sample_rate: DEFAULT_SAMPLE_RATE,
        };
        enhancer.update_coefficients();
        enhancer
    }

    pub fn set_amount(&mut self, amount: f32) {
        if amount.is_finite() {
            self.amount = amount.clamp(0.0, 1.0);
            self.update_coefficients();
        }
    }

    pub fn amount(&self) -> f32 {
        self.amount
    }

    /// Boost in dB at the band centre
    pub fn boost_db(&self) -> f32 {
        self.amount * MAX_PRESENCE_DB as f32
    }

    fn update_coefficients(&mut self) {
        self.filter.set_coefficients(BiquadCoefficients::peaking(
            self.sample_rate,
            PRESENCE_HZ,
            PRESENCE_Q,
            self.boost_db() as f64,
        ));
    }
}

impl Stage for ClarityEnhancer {
    fn configure(&mut self, sample_rate: u32, channels: usize) {
        self.sample_rate = sample_rate;
        self.filter.set_channels(channels);
        self.update_coefficients();
    }

    fn process(&mut self, samples: &mut [Sample]) {
        self.filter.process(samples);
    }

    fn reset(&mut self) {
        self.filter.reset();
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Dither
// ═══════════════════════════════════════════════════════════════════════════════

pub const DEFAULT_DITHER_BITS: u32 = 16;
pub const DITHER_BITS_RANGE: (u32, u32) = (8, 24);

/// TPDF dither and requantization to a target bit depth
///
/// Adds the sum of two uniform random values (±½ LSB each) before rounding
/// to the target grid, which decorrelates the quantization error from the
/// signal. Random numbers come from an xorshift64 generator, so there is no
/// allocation or syscall on the audio thread.
pub struct Dither {
    bits: u32,
    /// One LSB at the target depth, for a ±1.0 full scale
    quant_step: f32,
    rng_state: u64,
    channels: usize,
}

const RNG_SEED: u64 = 0x853c_49e6_748f_ea9b;

impl Dither {
    pub fn new(bits: u32) -> Self {
        let bits = bits.clamp(DITHER_BITS_RANGE.0, DITHER_BITS_RANGE.1);
        Self {
            bits,
            quant_step: 2.0 / (1u64 << bits) as f32,
            rng_state: RNG_SEED,
            channels: 2,
        }
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn quant_step(&self) -> f32 {
        self.quant_step
    }

    /// Uniform random value in [-1, 1]
    #[inline]
    fn next_random(&mut self) -> f32 {
        self.rng_state ^= self.rng_state >> 12;
        self.rng_state ^= self.rng_state << 25;
        self.rng_state ^= self.rng_state >> 27;
        let r = self.rng_state.wrapping_mul(0x2545_f491_4f6c_dd1d);
        ((r as i64 as f64) / (i64::MAX as f64)) as f32
    }

    #[inline]
    fn process_sample(&mut self, x: Sample) -> Sample {
        let noise = (self.next_random() + self.next_random()) * self.quant_step * 0.5;
        ((x + noise) / self.quant_step).round() * self.quant_step
    }
}

impl Default for Dither {
    fn default() -> Self {
        Self::new(DEFAULT_DITHER_BITS)
    }
}

impl Stage for Dither {
    fn configure(&mut self, _sample_rate: u32, channels: usize) {
        self.channels = clamp_channels(channels);
        self.reset();
    }

    fn process(&mut self, samples: &mut [Sample]) {
        let whole = samples.len() - samples.len() % self.channels;
        for sample in samples[..whole].iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    fn reset(&mut self) {
        self.rng_state = RNG_SEED;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn mono_sine(frames: usize, freq: f32, amplitude: f32) -> Vec<Sample> {
        (0..frames)
            .map(|i| amplitude * (2.0 * PI * freq * i as f32 / 44100.0).sin())
            .collect()
    }

    fn peak(samples: &[Sample]) -> f32 {
        samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    #[test]
    fn test_clarity_lifts_presence_band_only() {
        let mut clarity = ClarityEnhancer::new(0.2);
        clarity.configure(44100, 1);

        let mut presence = mono_sine(44100, 3000.0, 0.25);
        clarity.process(&mut presence);
        let gain = peak(&presence[22050..]) / 0.25;
        let expected = 10f32.powf(1.2 / 20.0);
        assert!((gain - expected).abs() < 0.02, "3kHz gain {} expected {}", gain, expected);

        clarity.reset();
        let mut bass = mono_sine(44100, 60.0, 0.25);
        clarity.process(&mut bass);
        let gain = peak(&bass[22050..]) / 0.25;
        assert!((gain - 1.0).abs() < 0.01, "60Hz gain {}", gain);
    }

    #[test]
    fn test_dither_output_on_grid_and_close() {
        let mut dither = Dither::new(16);
        dither.configure(44100, 2);

        let input = mono_sine(4410, 440.0, 0.5);
        let mut output = input.clone();
        dither.process(&mut output);

        let step = dither.quant_step();
        for (x, y) in input.iter().zip(&output) {
            let steps = y / step;
            assert!((steps - steps.round()).abs() < 1e-3, "{} is off the grid", y);
            assert!((x - y).abs() <= 1.51 * step, "error {} too large", (x - y).abs());
        }
    }

    #[test]
    fn test_dither_noise_is_deterministic_after_reset() {
        let mut dither = Dither::default();
        dither.configure(48000, 2);
        let mut first = vec![0.1; 64];
        dither.process(&mut first);

        dither.reset();
        let mut second = vec![0.1; 64];
        dither.process(&mut second);
        assert_eq!(first, second);
    }

    #[test]
    fn test_bits_clamped() {
        assert_eq!(Dither::new(2).bits(), 8);
        assert_eq!(Dither::new(32).bits(), 24);
    }
}
