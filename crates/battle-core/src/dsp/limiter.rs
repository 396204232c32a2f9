//! True-peak-aware limiter: the last stage of the battle chain
//!
//! Placed after the compressor:
//!   compressor → (dither) → **limiter** → output
//!
//! # Algorithm
//!
//! 1. The frame peak is the larger of the sampled peak and a parabolic
//!    estimate of the inter-sample peak around the previous sample, so
//!    reconstructed overshoots between samples are caught too.
//! 2. Above the threshold the target gain is `threshold / peak`.
//! 3. The gain moves toward the target with the attack coefficient when the
//!    target is lower (louder input) and the release coefficient when higher.
//! 4. Every channel is scaled by `min(gain, 1)`.
//! 5. Every sample is hard-clamped to `±ceiling`. Smoothing alone can overshoot
//!    on fast transients; the clamp guarantees `|out| <= ceiling`.
//!
//! Non-finite input samples are replaced with silence before detection.

use super::{clamp_channels, time_coefficient, Stage};
use crate::types::{db_to_linear, linear_to_db, Sample, DEFAULT_SAMPLE_RATE, MAX_CHANNELS};

// ═══════════════════════════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════════════════════════

pub const DEFAULT_THRESHOLD_DB: f32 = -0.3;
pub const DEFAULT_CEILING_DB: f32 = -0.1;
pub const DEFAULT_RELEASE_MS: f32 = 100.0;

pub const THRESHOLD_RANGE_DB: (f32, f32) = (-24.0, 0.0);
pub const CEILING_RANGE_DB: (f32, f32) = (-24.0, 0.0);
pub const RELEASE_RANGE_MS: (f32, f32) = (1.0, 2000.0);

/// Fixed attack time (0.5 ms)
const ATTACK_MS: f32 = 0.5;

// ═══════════════════════════════════════════════════════════════════════════════
// True peak
// ═══════════════════════════════════════════════════════════════════════════════

/// Parabolic estimate of the peak magnitude around `y1`
///
/// Fits a parabola through three consecutive samples. When the middle sample
/// is a local extremum the vertex lies between the outer samples and its
/// height is the estimate; otherwise the sampled magnitude is returned.
#[inline]
pub fn inter_sample_peak(y0: f32, y1: f32, y2: f32) -> f32 {
    let (a0, a1, a2) = (y0.abs(), y1.abs(), y2.abs());
    if a1 < a0 || a1 < a2 {
        return a1;
    }
    let curvature = y0 - 2.0 * y1 + y2;
    if curvature.abs() < 1e-12 {
        return a1;
    }
    let d = (y0 - y2) / (2.0 * curvature);
    if d.abs() < 1.0 {
        (y1 - 0.25 * (y0 - y2) * d).abs().max(a1)
    } else {
        a1
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Limiter
// ═══════════════════════════════════════════════════════════════════════════════

/// Peak limiter with a mandatory hard ceiling
pub struct TruePeakLimiter {
    threshold_db: f32,
    ceiling_db: f32,
    release_ms: f32,
    /// Threshold in linear amplitude
    threshold: f32,
    /// Ceiling in linear amplitude
    ceiling: f32,
    attack_coeff: f32,
    release_coeff: f32,
    /// Current smoothed gain (1.0 = unity)
    gain: f32,
    /// Last two input samples per channel, oldest first
    history: [[f32; 2]; MAX_CHANNELS],
    /// Set when the hard clamp altered a sample since the last `take_clipped`
    clipped: bool,
    sample_rate: u32,
    channels: usize,
}

impl TruePeakLimiter {
    pub fn new() -> Self {
        let mut limiter = Self {
            threshold_db: DEFAULT_THRESHOLD_DB,
            ceiling_db: DEFAULT_CEILING_DB,
            release_ms: DEFAULT_RELEASE_MS,
            threshold: db_to_linear(DEFAULT_THRESHOLD_DB),
            ceiling: db_to_linear(DEFAULT_CEILING_DB),
            attack_coeff: 1.0,
            release_coeff: 1.0,
            gain: 1.0,
            history: [[0.0; 2]; MAX_CHANNELS],
            clipped: false,
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: MAX_CHANNELS,
        };
        limiter.update_coefficients();
        limiter
    }

    pub fn set_threshold_db(&mut self, db: f32) {
        if db.is_finite() {
            self.threshold_db = db.clamp(THRESHOLD_RANGE_DB.0, THRESHOLD_RANGE_DB.1);
            self.threshold = db_to_linear(self.threshold_db);
        }
    }

    pub fn set_ceiling_db(&mut self, db: f32) {
        if db.is_finite() {
            self.ceiling_db = db.clamp(CEILING_RANGE_DB.0, CEILING_RANGE_DB.1);
            self.ceiling = db_to_linear(self.ceiling_db);
        }
    }

    pub fn set_release_ms(&mut self, ms: f32) {
        if ms.is_finite() {
            self.release_ms = ms.clamp(RELEASE_RANGE_MS.0, RELEASE_RANGE_MS.1);
            self.update_coefficients();
        }
    }

    fn update_coefficients(&mut self) {
        self.attack_coeff = time_coefficient(ATTACK_MS, self.sample_rate);
        self.release_coeff = time_coefficient(self.release_ms, self.sample_rate);
    }

    pub fn threshold_db(&self) -> f32 {
        self.threshold_db
    }

    pub fn ceiling_db(&self) -> f32 {
        self.ceiling_db
    }

    /// Ceiling in linear amplitude; no output sample exceeds it
    pub fn ceiling(&self) -> f32 {
        self.ceiling
    }

    /// Current gain reduction in dB (≥ 0)
    pub fn gain_reduction_db(&self) -> f32 {
        -linear_to_db(self.gain.min(1.0)).min(0.0)
    }

    /// Return and clear the clip flag
    pub fn take_clipped(&mut self) -> bool {
        std::mem::take(&mut self.clipped)
    }

    /// Peak of one frame including the inter-sample estimate, updating history
    #[inline]
    fn detect(&mut self, frame: &[Sample]) -> f32 {
        let mut peak = 0.0f32;
        for (history, &x) in self.history.iter_mut().zip(frame) {
            peak = peak
                .max(x.abs())
                .max(inter_sample_peak(history[0], history[1], x));
            *history = [history[1], x];
        }
        peak
    }
}

impl Default for TruePeakLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for TruePeakLimiter {
    fn configure(&mut self, sample_rate: u32, channels: usize) {
        self.sample_rate = sample_rate;
        self.channels = clamp_channels(channels);
        self.update_coefficients();
        self.reset();
    }

    fn process(&mut self, samples: &mut [Sample]) {
        let ceiling = self.ceiling;
        for frame in samples.chunks_exact_mut(self.channels) {
            for sample in frame.iter_mut() {
                if !sample.is_finite() {
                    *sample = 0.0;
                }
            }

            let peak = self.detect(frame);
            let target = if peak > self.threshold {
                self.threshold / peak
            } else {
                1.0
            };

            let coeff = if target < self.gain {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.gain += coeff * (target - self.gain);
            let gain = self.gain.min(1.0);

            for sample in frame.iter_mut() {
                let limited = *sample * gain;
                let clamped = limited.clamp(-ceiling, ceiling);
                if clamped != limited {
                    self.clipped = true;
                }
                *sample = clamped;
            }
        }
    }

    fn reset(&mut self) {
        self.gain = 1.0;
        self.history = [[0.0; 2]; MAX_CHANNELS];
        self.clipped = false;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn make_buffer(frames: &[(f32, f32)]) -> Vec<Sample> {
        frames.iter().flat_map(|&(l, r)| [l, r]).collect()
    }

    fn max_abs(samples: &[Sample]) -> f32 {
        samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    #[test]
    fn test_below_threshold_is_transparent() {
        let mut limiter = TruePeakLimiter::new();
        limiter.configure(44100, 2);

        let input = make_buffer(&[(0.1, -0.2), (0.3, 0.4), (-0.5, 0.0), (0.2, 0.2)]);
        let mut output = input.clone();
        limiter.process(&mut output);

        for (i, (a, b)) in input.iter().zip(&output).enumerate() {
            assert_eq!(a, b, "sample {} changed: {} -> {}", i, a, b);
        }
    }

    #[test]
    fn test_single_full_scale_impulse_respects_ceiling() {
        let mut limiter = TruePeakLimiter::new();
        limiter.configure(44100, 2);

        let mut buffer = vec![0.0; 256];
        buffer[100] = 1.0;
        buffer[101] = -1.0;
        limiter.process(&mut buffer);

        assert!(max_abs(&buffer) <= limiter.ceiling());
        assert!(limiter.take_clipped());
        assert!(!limiter.take_clipped());
    }

    #[test]
    fn test_ceiling_holds_for_any_setting() {
        for ceiling_db in [-24.0, -6.0, -0.5, -0.1, 0.0] {
            for threshold_db in [-24.0, -3.0, 0.0] {
                let mut limiter = TruePeakLimiter::new();
                limiter.configure(48000, 2);
                limiter.set_ceiling_db(ceiling_db);
                limiter.set_threshold_db(threshold_db);

                let mut buffer: Vec<Sample> = (0..4800)
                    .map(|i| ((i * 7919) % 200) as f32 / 50.0 - 2.0)
                    .collect();
                limiter.process(&mut buffer);

                let peak = max_abs(&buffer);
                assert!(
                    peak <= limiter.ceiling(),
                    "ceiling {}dB threshold {}dB: peak {} > {}",
                    ceiling_db,
                    threshold_db,
                    peak,
                    limiter.ceiling()
                );
            }
        }
    }

    #[test]
    fn test_hot_signal_is_reduced() {
        let mut limiter = TruePeakLimiter::new();
        limiter.configure(44100, 2);
        limiter.set_threshold_db(-6.0);

        let mut buffer = make_buffer(&vec![(0.9, -0.9); 4410]);
        limiter.process(&mut buffer);

        let tail = &buffer[buffer.len() - 100..];
        let threshold = db_to_linear(-6.0);
        assert!(
            max_abs(tail) <= threshold * 1.01,
            "settled level {} above threshold {}",
            max_abs(tail),
            threshold
        );
        assert!(limiter.gain_reduction_db() > 4.0);
    }

    #[test]
    fn test_gain_recovers_after_transient() {
        let mut limiter = TruePeakLimiter::new();
        limiter.configure(44100, 2);

        let mut burst = make_buffer(&vec![(1.5, 1.5); 441]);
        limiter.process(&mut burst);
        assert!(limiter.gain_reduction_db() > 1.0);

        // One second of quiet signal lets the 100ms release recover
        let mut quiet = make_buffer(&vec![(0.1, 0.1); 44100]);
        limiter.process(&mut quiet);
        assert!(limiter.gain_reduction_db() < 0.01);
    }

    #[test]
    fn test_non_finite_samples_silenced() {
        let mut limiter = TruePeakLimiter::new();
        limiter.configure(44100, 2);

        let mut buffer = vec![f32::NAN, f32::INFINITY, 0.5, f32::NEG_INFINITY];
        limiter.process(&mut buffer);
        assert!(buffer.iter().all(|s| s.is_finite()));
        assert!(max_abs(&buffer) <= limiter.ceiling());
    }

    #[test]
    fn test_inter_sample_peak_estimate() {
        // Symmetric samples around a peak between them
        let estimate = inter_sample_peak(0.5, 0.9, 0.9);
        assert!(estimate > 0.9, "estimate {}", estimate);

        // Not an extremum: sampled magnitude
        assert_eq!(inter_sample_peak(0.1, 0.2, 0.3), 0.2);

        // Straight line through an extremum is impossible, flat top stays flat
        assert_eq!(inter_sample_peak(0.5, 0.5, 0.5), 0.5);
    }

    #[test]
    fn test_parameters_clamped() {
        let mut limiter = TruePeakLimiter::new();
        limiter.set_ceiling_db(3.0);
        assert_eq!(limiter.ceiling_db(), 0.0);
        limiter.set_threshold_db(-100.0);
        assert_eq!(limiter.threshold_db(), -24.0);
    }
}
