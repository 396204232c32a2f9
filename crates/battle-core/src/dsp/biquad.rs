//! Biquad filters (Audio EQ Cookbook designs)
//!
//! A transposed direct form II core shared by the bass-boost shelf, the
//! rumble high-pass and the clarity peaking band. Coefficients and state are
//! kept in `f64`: a 20Hz corner at 192kHz puts the poles very close to the
//! unit circle, where `f32` coefficients drift audibly.

use super::{clamp_channels, Stage};
use crate::types::{Sample, DEFAULT_SAMPLE_RATE, MAX_CHANNELS};
use std::f64::consts::PI;

/// Normalized biquad coefficients (a0 = 1)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoefficients {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoefficients {
    /// Pass-through
    pub const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    fn normalized(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Angular frequency, with the corner kept below Nyquist
    fn omega(sample_rate: u32, frequency_hz: f64) -> f64 {
        let sr = sample_rate.max(1) as f64;
        let freq = frequency_hz.clamp(1.0, sr * 0.49);
        2.0 * PI * freq / sr
    }

    /// Low shelf with shelf slope `slope` (1.0 = steepest without overshoot)
    pub fn low_shelf(sample_rate: u32, frequency_hz: f64, gain_db: f64, slope: f64) -> Self {
        let a = 10f64.powf(gain_db / 40.0);
        let w0 = Self::omega(sample_rate, frequency_hz);
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / 2.0 * ((a + 1.0 / a) * (1.0 / slope - 1.0) + 2.0).sqrt();
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        Self::normalized(
            a * ((a + 1.0) - (a - 1.0) * cos + two_sqrt_a_alpha),
            2.0 * a * ((a - 1.0) - (a + 1.0) * cos),
            a * ((a + 1.0) - (a - 1.0) * cos - two_sqrt_a_alpha),
            (a + 1.0) + (a - 1.0) * cos + two_sqrt_a_alpha,
            -2.0 * ((a - 1.0) + (a + 1.0) * cos),
            (a + 1.0) + (a - 1.0) * cos - two_sqrt_a_alpha,
        )
    }

    /// Second-order high-pass
    pub fn high_pass(sample_rate: u32, frequency_hz: f64, q: f64) -> Self {
        let w0 = Self::omega(sample_rate, frequency_hz);
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * q.max(0.01));

        Self::normalized(
            (1.0 + cos) / 2.0,
            -(1.0 + cos),
            (1.0 + cos) / 2.0,
            1.0 + alpha,
            -2.0 * cos,
            1.0 - alpha,
        )
    }

    /// Peaking band
    pub fn peaking(sample_rate: u32, frequency_hz: f64, q: f64, gain_db: f64) -> Self {
        let a = 10f64.powf(gain_db / 40.0);
        let w0 = Self::omega(sample_rate, frequency_hz);
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * q.max(0.01));

        Self::normalized(
            1.0 + alpha * a,
            -2.0 * cos,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cos,
            1.0 - alpha / a,
        )
    }

    /// Magnitude response at DC (z = 1)
    pub fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }
}

impl Default for BiquadCoefficients {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Per-channel filter memory
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    z1: f64,
    z2: f64,
}

impl BiquadState {
    #[inline]
    fn tick(&mut self, c: &BiquadCoefficients, x: f64) -> f64 {
        let y = c.b0 * x + self.z1;
        self.z1 = c.b1 * x - c.a1 * y + self.z2;
        self.z2 = c.b2 * x - c.a2 * y;
        y
    }
}

/// Multi-channel biquad with independent state per channel
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    coefficients: BiquadCoefficients,
    states: [BiquadState; MAX_CHANNELS],
    channels: usize,
}

impl BiquadFilter {
    pub fn new(coefficients: BiquadCoefficients) -> Self {
        Self {
            coefficients,
            states: [BiquadState::default(); MAX_CHANNELS],
            channels: MAX_CHANNELS,
        }
    }

    /// Swap coefficients, keeping the filter history
    pub fn set_coefficients(&mut self, coefficients: BiquadCoefficients) {
        self.coefficients = coefficients;
    }

    pub fn coefficients(&self) -> &BiquadCoefficients {
        &self.coefficients
    }

    pub fn set_channels(&mut self, channels: usize) {
        self.channels = clamp_channels(channels);
        self.reset();
    }

    /// Filter one sample of one channel
    #[inline]
    pub fn process_sample(&mut self, channel: usize, x: Sample) -> Sample {
        self.states[channel].tick(&self.coefficients, x as f64) as Sample
    }

    /// Filter interleaved samples in place
    pub fn process(&mut self, samples: &mut [Sample]) {
        let channels = self.channels;
        for frame in samples.chunks_exact_mut(channels) {
            for (ch, sample) in frame.iter_mut().enumerate() {
                *sample = self.states[ch].tick(&self.coefficients, *sample as f64) as Sample;
            }
        }
    }

    pub fn reset(&mut self) {
        self.states = [BiquadState::default(); MAX_CHANNELS];
    }
}

impl Default for BiquadFilter {
    fn default() -> Self {
        Self::new(BiquadCoefficients::IDENTITY)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Bass Boost
// ═══════════════════════════════════════════════════════════════════════════════

/// Maximum shelf boost in dB
pub const MAX_BASS_BOOST_DB: f32 = 24.0;
/// Lowest shelf corner in Hz
pub const MIN_BASS_FREQUENCY_HZ: f32 = 20.0;
/// Highest shelf corner in Hz
pub const MAX_BASS_FREQUENCY_HZ: f32 = 200.0;
/// Default shelf corner in Hz
pub const DEFAULT_BASS_FREQUENCY_HZ: f32 = 80.0;
/// Shelf slope giving a Butterworth-like transition
const SHELF_SLOPE: f64 = 0.707;
/// How long the filter keeps running after the gain returns to zero
const TAIL_MS: f32 = 100.0;

/// Low-shelf bass boost stage
///
/// Coefficients are recomputed only when gain or corner change. At zero gain
/// the coefficients are exactly identity; the stage keeps running for a short
/// tail after the boost is removed so the ringing history decays instead of
/// being cut, then reports itself inactive so the chain can skip it.
pub struct BassBoost {
    filter: BiquadFilter,
    sample_rate: u32,
    gain_db: f32,
    frequency_hz: f32,
    tail_remaining: usize,
}

impl BassBoost {
    pub fn new() -> Self {
        Self {
            filter: BiquadFilter::default(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            gain_db: 0.0,
            frequency_hz: DEFAULT_BASS_FREQUENCY_HZ,
            tail_remaining: 0,
        }
    }

    /// Set the shelf gain in dB, clamped to 0-24
    pub fn set_gain_db(&mut self, gain_db: f32) {
        if !gain_db.is_finite() {
            return;
        }
        let gain_db = gain_db.clamp(0.0, MAX_BASS_BOOST_DB);
        if gain_db == self.gain_db {
            return;
        }
        if gain_db == 0.0 {
            self.tail_remaining = self.tail_frames();
        }
        self.gain_db = gain_db;
        self.update_coefficients();
    }

    /// Set the shelf corner in Hz, clamped to 20-200
    pub fn set_frequency_hz(&mut self, frequency_hz: f32) {
        if !frequency_hz.is_finite() {
            return;
        }
        let frequency_hz = frequency_hz.clamp(MIN_BASS_FREQUENCY_HZ, MAX_BASS_FREQUENCY_HZ);
        if frequency_hz == self.frequency_hz {
            return;
        }
        self.frequency_hz = frequency_hz;
        self.update_coefficients();
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    pub fn frequency_hz(&self) -> f32 {
        self.frequency_hz
    }

    /// Whether the stage still affects the signal
    pub fn is_active(&self) -> bool {
        self.gain_db > 0.0 || self.tail_remaining > 0
    }

    pub fn coefficients(&self) -> &BiquadCoefficients {
        self.filter.coefficients()
    }

    fn tail_frames(&self) -> usize {
        (TAIL_MS * self.sample_rate as f32 / 1000.0) as usize
    }

    fn update_coefficients(&mut self) {
        let coefficients = if self.gain_db == 0.0 {
            BiquadCoefficients::IDENTITY
        } else {
            BiquadCoefficients::low_shelf(
                self.sample_rate,
                self.frequency_hz as f64,
                self.gain_db as f64,
                SHELF_SLOPE,
            )
        };
        self.filter.set_coefficients(coefficients);
    }
}

impl Default for BassBoost {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for BassBoost {
    fn configure(&mut self, sample_rate: u32, channels: usize) {
        self.sample_rate = sample_rate;
        self.filter.set_channels(channels);
        self.tail_remaining = 0;
        self.update_coefficients();
    }

    fn process(&mut self, samples: &mut [Sample]) {
        self.filter.process(samples);
        if self.gain_db == 0.0 && self.tail_remaining > 0 {
            let frames = samples.len() / self.filter.channels;
            self.tail_remaining = self.tail_remaining.saturating_sub(frames);
            if self.tail_remaining == 0 {
                self.filter.reset();
            }
        }
    }

    fn reset(&mut self) {
        self.filter.reset();
        self.tail_remaining = 0;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frames: usize, freq: f32, sample_rate: u32, amplitude: f32) -> Vec<Sample> {
        (0..frames)
            .flat_map(|i| {
                let s = amplitude
                    * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin();
                [s, s]
            })
            .collect()
    }

    fn rms(samples: &[Sample]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn test_low_shelf_dc_gain_matches_boost() {
        for gain in [3.0, 6.0, 12.0, 24.0] {
            let c = BiquadCoefficients::low_shelf(44100, 80.0, gain, SHELF_SLOPE);
            let expected = 10f64.powf(gain / 20.0);
            assert!(
                (c.dc_gain() - expected).abs() < 1e-6 * expected.max(1.0) * 100.0,
                "gain {}dB: dc {} expected {}",
                gain,
                c.dc_gain(),
                expected
            );
        }
    }

    #[test]
    fn test_zero_gain_is_transparent() {
        let mut boost = BassBoost::new();
        boost.configure(44100, 2);
        boost.set_gain_db(0.0);

        let input = sine(2048, 60.0, 44100, 0.5);
        let mut output = input.clone();
        boost.process(&mut output);

        assert_eq!(output, input);
        assert!(!boost.is_active());
    }

    #[test]
    fn test_zero_gain_after_boost_settles_to_input() {
        for freq in [20.0, 80.0, 200.0] {
            let mut boost = BassBoost::new();
            boost.configure(48000, 2);
            boost.set_frequency_hz(freq);
            boost.set_gain_db(12.0);

            let mut warm = sine(4800, 50.0, 48000, 0.5);
            boost.process(&mut warm);

            boost.set_gain_db(0.0);
            assert!(boost.is_active(), "tail should keep the stage running");

            // Past the tail the stage must be an exact pass-through
            let mut settle = sine(9600, 50.0, 48000, 0.5);
            boost.process(&mut settle);
            assert!(!boost.is_active());

            let input = sine(1024, 50.0, 48000, 0.5);
            let mut output = input.clone();
            boost.process(&mut output);
            for (i, (a, b)) in input.iter().zip(&output).enumerate() {
                assert!((a - b).abs() < 1e-6, "freq {}: sample {} differs: {} vs {}", freq, i, a, b);
            }
        }
    }

    #[test]
    fn test_boost_raises_low_band_not_high_band() {
        let mut boost = BassBoost::new();
        boost.configure(44100, 2);
        boost.set_gain_db(12.0);

        let mut low = sine(44100, 20.0, 44100, 0.1);
        boost.process(&mut low);
        let low_gain = rms(&low[44100..]) / rms(&sine(22050, 20.0, 44100, 0.1));
        assert!(low_gain > 3.0, "20Hz gain {} should approach +12dB", low_gain);

        boost.reset();
        let mut high = sine(44100, 5000.0, 44100, 0.1);
        boost.process(&mut high);
        let high_gain = rms(&high[44100..]) / rms(&sine(22050, 5000.0, 44100, 0.1));
        assert!((high_gain - 1.0).abs() < 0.05, "5kHz gain {} should be unity", high_gain);
    }

    #[test]
    fn test_parameters_clamped() {
        let mut boost = BassBoost::new();
        boost.set_gain_db(40.0);
        assert_eq!(boost.gain_db(), MAX_BASS_BOOST_DB);
        boost.set_gain_db(-3.0);
        assert_eq!(boost.gain_db(), 0.0);
        boost.set_frequency_hz(5.0);
        assert_eq!(boost.frequency_hz(), MIN_BASS_FREQUENCY_HZ);
        boost.set_frequency_hz(1000.0);
        assert_eq!(boost.frequency_hz(), MAX_BASS_FREQUENCY_HZ);
        boost.set_frequency_hz(f32::NAN);
        assert_eq!(boost.frequency_hz(), MAX_BASS_FREQUENCY_HZ);
    }

    #[test]
    fn test_coefficients_only_change_with_parameters() {
        let mut boost = BassBoost::new();
        boost.configure(44100, 2);
        boost.set_gain_db(6.0);
        let before = *boost.coefficients();
        boost.set_gain_db(6.0);
        assert_eq!(*boost.coefficients(), before);
        boost.set_frequency_hz(120.0);
        assert_ne!(*boost.coefficients(), before);
    }

    #[test]
    fn test_high_pass_blocks_dc() {
        let c = BiquadCoefficients::high_pass(44100, 20.0, 0.707);
        assert!(c.dc_gain().abs() < 1e-9);
    }

    #[test]
    fn test_peaking_leaves_dc_alone() {
        let c = BiquadCoefficients::peaking(44100, 3000.0, 0.7, 6.0);
        assert!((c.dc_gain() - 1.0).abs() < 1e-9);
    }
}
