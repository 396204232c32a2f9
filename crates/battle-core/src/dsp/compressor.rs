//! Punch compressor
//!
//! A feed-forward compressor driven by a single envelope shared across
//! channels, so stereo content is reduced by the same amount on both sides
//! and the image doesn't wander.
//!
//! The gain computer is a straight hard knee by default:
//!
//! ```text
//! reduction = (env_db - threshold_db) * (1 - 1/ratio)     env_db > threshold_db
//! ```
//!
//! A non-zero `knee_db` switches to the quadratic soft-knee curve spanning
//! `threshold ± knee/2`. The applied gain (makeup minus reduction) is smoothed
//! with a fixed fast one-pole, independent of attack/release, so block-level
//! parameter changes don't stair-step.

use super::{clamp_channels, time_coefficient, EnvelopeFollower, Stage};
use crate::types::{db_to_linear, frame_peak, linear_to_db, Sample, DEFAULT_SAMPLE_RATE};

// ═══════════════════════════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════════════════════════

pub const DEFAULT_THRESHOLD_DB: f32 = -12.0;
pub const DEFAULT_RATIO: f32 = 4.0;
pub const DEFAULT_ATTACK_MS: f32 = 5.0;
pub const DEFAULT_RELEASE_MS: f32 = 100.0;
pub const DEFAULT_MAKEUP_DB: f32 = 6.0;

pub const THRESHOLD_RANGE_DB: (f32, f32) = (-60.0, 0.0);
pub const RATIO_RANGE: (f32, f32) = (1.0, 20.0);
pub const ATTACK_RANGE_MS: (f32, f32) = (0.1, 200.0);
pub const RELEASE_RANGE_MS: (f32, f32) = (1.0, 2000.0);
pub const MAKEUP_RANGE_DB: (f32, f32) = (0.0, 24.0);
pub const KNEE_RANGE_DB: (f32, f32) = (0.0, 24.0);

/// Time constant of the applied-gain smoother
const GAIN_SMOOTHING_MS: f32 = 0.25;

// ═══════════════════════════════════════════════════════════════════════════════
// Compressor
// ═══════════════════════════════════════════════════════════════════════════════

/// Shared-envelope dynamics compressor with makeup gain
pub struct PunchCompressor {
    envelope: EnvelopeFollower,
    threshold_db: f32,
    ratio: f32,
    knee_db: f32,
    makeup_db: f32,
    smoothed_gain: f32,
    smoothing_coeff: f32,
    gain_reduction_db: f32,
    channels: usize,
}

impl PunchCompressor {
    pub fn new() -> Self {
        Self {
            envelope: EnvelopeFollower::new(
                DEFAULT_ATTACK_MS,
                DEFAULT_RELEASE_MS,
                DEFAULT_SAMPLE_RATE,
            ),
            threshold_db: DEFAULT_THRESHOLD_DB,
            ratio: DEFAULT_RATIO,
            knee_db: 0.0,
            makeup_db: DEFAULT_MAKEUP_DB,
            smoothed_gain: db_to_linear(DEFAULT_MAKEUP_DB),
            smoothing_coeff: time_coefficient(GAIN_SMOOTHING_MS, DEFAULT_SAMPLE_RATE),
            gain_reduction_db: 0.0,
            channels: 2,
        }
    }

    pub fn set_threshold_db(&mut self, db: f32) {
        if db.is_finite() {
            self.threshold_db = db.clamp(THRESHOLD_RANGE_DB.0, THRESHOLD_RANGE_DB.1);
        }
    }

    pub fn set_ratio(&mut self, ratio: f32) {
        if ratio.is_finite() {
            self.ratio = ratio.clamp(RATIO_RANGE.0, RATIO_RANGE.1);
        }
    }

    pub fn set_attack_ms(&mut self, ms: f32) {
        if ms.is_finite() {
            self.envelope
                .set_attack_ms(ms.clamp(ATTACK_RANGE_MS.0, ATTACK_RANGE_MS.1));
        }
    }

    pub fn set_release_ms(&mut self, ms: f32) {
        if ms.is_finite() {
            self.envelope
                .set_release_ms(ms.clamp(RELEASE_RANGE_MS.0, RELEASE_RANGE_MS.1));
        }
    }

    pub fn set_makeup_db(&mut self, db: f32) {
        if db.is_finite() {
            self.makeup_db = db.clamp(MAKEUP_RANGE_DB.0, MAKEUP_RANGE_DB.1);
        }
    }

    /// Knee width in dB; 0 is a hard knee
    pub fn set_knee_db(&mut self, db: f32) {
        if db.is_finite() {
            self.knee_db = db.clamp(KNEE_RANGE_DB.0, KNEE_RANGE_DB.1);
        }
    }

    pub fn threshold_db(&self) -> f32 {
        self.threshold_db
    }

    pub fn ratio(&self) -> f32 {
        self.ratio
    }

    pub fn makeup_db(&self) -> f32 {
        self.makeup_db
    }

    pub fn knee_db(&self) -> f32 {
        self.knee_db
    }

    /// Gain reduction applied on the last processed frame, in dB (≥ 0)
    pub fn gain_reduction_db(&self) -> f32 {
        self.gain_reduction_db
    }

    /// Static gain computer: reduction in dB for an envelope level in dB
    pub fn compute_reduction_db(&self, level_db: f32) -> f32 {
        let slope = 1.0 - 1.0 / self.ratio;
        let overshoot = level_db - self.threshold_db;

        if self.knee_db <= 0.0 {
            return if overshoot > 0.0 { overshoot * slope } else { 0.0 };
        }

        let half_knee = self.knee_db / 2.0;
        if overshoot <= -half_knee {
            0.0
        } else if overshoot >= half_knee {
            overshoot * slope
        } else {
            let x = overshoot + half_knee;
            x * x / (2.0 * self.knee_db) * slope
        }
    }
}

impl Default for PunchCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for PunchCompressor {
    fn configure(&mut self, sample_rate: u32, channels: usize) {
        self.channels = clamp_channels(channels);
        self.envelope.set_sample_rate(sample_rate);
        self.smoothing_coeff = time_coefficient(GAIN_SMOOTHING_MS, sample_rate);
        self.reset();
    }

    fn process(&mut self, samples: &mut [Sample]) {
        for frame in samples.chunks_exact_mut(self.channels) {
            let env = self.envelope.process(frame_peak(frame));
            let reduction = self.compute_reduction_db(linear_to_db(env));
            let target = db_to_linear(self.makeup_db - reduction);

            self.smoothed_gain += self.smoothing_coeff * (target - self.smoothed_gain);
            self.gain_reduction_db = reduction;

            for sample in frame.iter_mut() {
                *sample *= self.smoothed_gain;
            }
        }
    }

    fn reset(&mut self) {
        self.envelope.reset();
        self.smoothed_gain = db_to_linear(self.makeup_db);
        self.gain_reduction_db = 0.0;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    /// Stereo square wave at a fixed level so the envelope settles exactly
    fn make_buffer(frames: usize, level: f32) -> Vec<Sample> {
        (0..frames)
            .flat_map(|i| {
                let s = if (i / 50) % 2 == 0 { level } else { -level };
                [s, s]
            })
            .collect()
    }

    fn settled_peak(compressor: &mut PunchCompressor, level: f32) -> f32 {
        let mut buffer = make_buffer(44100, level);
        compressor.process(&mut buffer);
        buffer[buffer.len() - 4410..]
            .iter()
            .fold(0.0f32, |m, s| m.max(s.abs()))
    }

    #[test]
    fn test_below_threshold_only_makeup() {
        let mut comp = PunchCompressor::new();
        comp.configure(44100, 2);
        comp.set_threshold_db(-6.0);
        comp.set_makeup_db(0.0);

        let peak = settled_peak(&mut comp, 0.1);
        assert!((peak - 0.1).abs() < 1e-4, "peak {}", peak);
        assert_eq!(comp.gain_reduction_db(), 0.0);
    }

    #[test]
    fn test_hard_knee_reduction_formula() {
        let mut comp = PunchCompressor::new();
        comp.set_threshold_db(-20.0);
        comp.set_ratio(4.0);
        assert_eq!(comp.compute_reduction_db(-30.0), 0.0);
        assert!((comp.compute_reduction_db(-8.0) - 9.0).abs() < 1e-5);
    }

    #[test]
    fn test_soft_knee_is_continuous_and_below_hard_knee() {
        let mut comp = PunchCompressor::new();
        comp.set_threshold_db(-20.0);
        comp.set_ratio(4.0);
        comp.set_knee_db(10.0);

        // Curve meets the straight line at both knee edges
        assert!(comp.compute_reduction_db(-25.0).abs() < 1e-6);
        assert!((comp.compute_reduction_db(-15.0) - 3.75).abs() < 1e-5);

        let soft_at_threshold = comp.compute_reduction_db(-20.0);
        assert!(soft_at_threshold > 0.0 && soft_at_threshold < 3.75 / 2.0);
    }

    #[test]
    fn test_higher_ratio_never_louder() {
        let mut previous = f32::MAX;
        for ratio in [1.0, 1.5, 2.0, 4.0, 8.0, 12.0, 20.0] {
            let mut comp = PunchCompressor::new();
            comp.configure(44100, 2);
            comp.set_threshold_db(-20.0);
            comp.set_ratio(ratio);

            let peak = settled_peak(&mut comp, 0.5);
            assert!(
                peak <= previous + 1e-6,
                "ratio {} produced {} after {}",
                ratio,
                peak,
                previous
            );
            previous = peak;
        }
    }

    #[test]
    fn test_shared_envelope_keeps_channels_balanced() {
        let mut comp = PunchCompressor::new();
        comp.configure(44100, 2);
        comp.set_threshold_db(-30.0);

        // Loud left, quiet right: both get the same gain
        let mut buffer: Vec<Sample> = (0..4410).flat_map(|_| [0.8, 0.2]).collect();
        comp.process(&mut buffer);
        for frame in buffer.chunks_exact(2) {
            assert!((frame[0] / frame[1] - 4.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_reset_clears_envelope() {
        let mut comp = PunchCompressor::new();
        comp.configure(44100, 2);
        settled_peak(&mut comp, 0.9);
        assert!(comp.gain_reduction_db() > 0.0);
        comp.reset();
        assert_eq!(comp.gain_reduction_db(), 0.0);
    }

    #[test]
    fn test_parameters_clamped() {
        let mut comp = PunchCompressor::new();
        comp.set_ratio(0.2);
        assert_eq!(comp.ratio(), 1.0);
        comp.set_ratio(100.0);
        assert_eq!(comp.ratio(), 20.0);
        comp.set_threshold_db(12.0);
        assert_eq!(comp.threshold_db(), 0.0);
        comp.set_makeup_db(f32::INFINITY);
        assert_eq!(comp.makeup_db(), DEFAULT_MAKEUP_DB);
    }
}
