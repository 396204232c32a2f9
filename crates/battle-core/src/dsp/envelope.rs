//! Attack/release envelope follower

use super::time_coefficient;
use crate::types::DEFAULT_SAMPLE_RATE;

/// Tracks a smoothed magnitude with separate rise and fall times
///
/// When the input exceeds the envelope it moves with the attack coefficient,
/// otherwise with the release coefficient. Keeping attack short and release
/// long catches transients immediately while letting gain recover smoothly.
#[derive(Debug, Clone)]
pub struct EnvelopeFollower {
    envelope: f32,
    attack_ms: f32,
    release_ms: f32,
    attack_coeff: f32,
    release_coeff: f32,
    sample_rate: u32,
}

impl EnvelopeFollower {
    pub fn new(attack_ms: f32, release_ms: f32, sample_rate: u32) -> Self {
        let mut follower = Self {
            envelope: 0.0,
            attack_ms,
            release_ms,
            attack_coeff: 1.0,
            release_coeff: 1.0,
            sample_rate,
        };
        follower.update_coefficients();
        follower
    }

    pub fn set_attack_ms(&mut self, attack_ms: f32) {
        if attack_ms != self.attack_ms {
            self.attack_ms = attack_ms;
            self.update_coefficients();
        }
    }

    pub fn set_release_ms(&mut self, release_ms: f32) {
        if release_ms != self.release_ms {
            self.release_ms = release_ms;
            self.update_coefficients();
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        self.update_coefficients();
        self.reset();
    }

    fn update_coefficients(&mut self) {
        self.attack_coeff = time_coefficient(self.attack_ms, self.sample_rate);
        self.release_coeff = time_coefficient(self.release_ms, self.sample_rate);
    }

    /// Feed one magnitude sample and return the updated envelope
    #[inline]
    pub fn process(&mut self, magnitude: f32) -> f32 {
        let coeff = if magnitude > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope += coeff * (magnitude - self.envelope);
        self.envelope
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.envelope
    }

    pub fn reset(&mut self) {
        self.envelope = 0.0;
    }
}

impl Default for EnvelopeFollower {
    fn default() -> Self {
        Self::new(5.0, 100.0, DEFAULT_SAMPLE_RATE)
    }
}
