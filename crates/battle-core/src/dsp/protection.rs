//! Speaker protection stages
//!
//! Enabled by hardware protection while battle mode is on. Both run ahead of
//! the limiter so the ceiling is spent on audible content rather than on
//! subsonic rumble or a DC offset.

use super::{clamp_channels, BiquadCoefficients, BiquadFilter, Stage};
use crate::types::{Sample, MAX_CHANNELS};

/// Rumble high-pass corner
pub const RUMBLE_CORNER_HZ: f64 = 20.0;
const RUMBLE_Q: f64 = 0.707;

/// DC blocker pole frequency
const DC_CORNER_HZ: f32 = 5.0;

/// Second-order 20Hz high-pass
pub struct RumbleFilter {
    filter: BiquadFilter,
}

impl RumbleFilter {
    pub fn new() -> Self {
        Self {
            filter: BiquadFilter::new(BiquadCoefficients::high_pass(
                crate::types::DEFAULT_SAMPLE_RATE,
                RUMBLE_CORNER_HZ,
                RUMBLE_Q,
            )),
        }
    }
}

impl Default for RumbleFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for RumbleFilter {
    fn configure(&mut self, sample_rate: u32, channels: usize) {
        self.filter.set_coefficients(BiquadCoefficients::high_pass(
            sample_rate,
            RUMBLE_CORNER_HZ,
            RUMBLE_Q,
        ));
        self.filter.set_channels(channels);
    }

    fn process(&mut self, samples: &mut [Sample]) {
        self.filter.process(samples);
    }

    fn reset(&mut self) {
        self.filter.reset();
    }
}

/// One-pole DC blocker: `y[n] = x[n] - x[n-1] + R * y[n-1]`
pub struct DcBlocker {
    /// Pole radius
    r: f32,
    x1: [f32; MAX_CHANNELS],
    y1: [f32; MAX_CHANNELS],
    channels: usize,
}

impl DcBlocker {
    pub fn new() -> Self {
        Self {
            r: 0.995,
            x1: [0.0; MAX_CHANNELS],
            y1: [0.0; MAX_CHANNELS],
            channels: MAX_CHANNELS,
        }
    }
}

impl Default for DcBlocker {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for DcBlocker {
    fn configure(&mut self, sample_rate: u32, channels: usize) {
        // Keeps the corner fixed in Hz across sample rates
        self.r = 1.0 - 2.0 * std::f32::consts::PI * DC_CORNER_HZ / sample_rate.max(1) as f32;
        self.channels = clamp_channels(channels);
        self.reset();
    }

    fn process(&mut self, samples: &mut [Sample]) {
        for frame in samples.chunks_exact_mut(self.channels) {
            for (ch, sample) in frame.iter_mut().enumerate() {
                let x = *sample;
                let y = x - self.x1[ch] + self.r * self.y1[ch];
                self.x1[ch] = x;
                self.y1[ch] = y;
                *sample = y;
            }
        }
    }

    fn reset(&mut self) {
        self.x1 = [0.0; MAX_CHANNELS];
        self.y1 = [0.0; MAX_CHANNELS];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn stereo_sine(frames: usize, freq: f32, offset: f32) -> Vec<Sample> {
        (0..frames)
            .flat_map(|i| {
                let s = 0.5 * (2.0 * PI * freq * i as f32 / 44100.0).sin() + offset;
                [s, s]
            })
            .collect()
    }

    fn mean(samples: &[Sample]) -> f32 {
        samples.iter().sum::<f32>() / samples.len() as f32
    }

    #[test]
    fn test_dc_blocker_removes_offset() {
        let mut blocker = DcBlocker::new();
        blocker.configure(44100, 2);

        let mut buffer = stereo_sine(88200, 441.0, 0.3);
        blocker.process(&mut buffer);

        let tail = &buffer[buffer.len() - 8820..];
        assert!(mean(tail).abs() < 0.005, "residual DC {}", mean(tail));
    }

    #[test]
    fn test_rumble_filter_cuts_subsonic() {
        let mut rumble = RumbleFilter::new();
        rumble.configure(44100, 2);

        let mut low = stereo_sine(88200, 5.0, 0.0);
        rumble.process(&mut low);
        let low_peak = low[44100..].iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(low_peak < 0.05, "5Hz leaked at {}", low_peak);

        rumble.reset();
        let mut music = stereo_sine(88200, 200.0, 0.0);
        rumble.process(&mut music);
        let music_peak = music[44100..].iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(music_peak > 0.49, "200Hz attenuated to {}", music_peak);
    }
}
