//! Parameter snapshots passed from the control thread to the audio thread
//!
//! Every write goes through a clamping setter: out-of-range values are
//! pulled into range, non-finite values leave the parameter unchanged. The
//! snapshots are `Copy` so they can travel through the command queue by
//! value.

use serde::{Deserialize, Serialize};

use super::profile::OperatingProfile;
use crate::dsp::biquad::{
    DEFAULT_BASS_FREQUENCY_HZ, MAX_BASS_BOOST_DB, MAX_BASS_FREQUENCY_HZ, MIN_BASS_FREQUENCY_HZ,
};
use crate::dsp::{compressor, limiter};
use crate::timestretch::{
    ratio_to_semitones, semitones_to_ratio, StretchSettings, MAX_PITCH_SEMITONES, MAX_TEMPO,
    MIN_PITCH_SEMITONES, MIN_TEMPO,
};

/// Rate mode range; the pitch ratio follows the rate across all of it
pub const MIN_RATE: f64 = MIN_TEMPO;
pub const MAX_RATE: f64 = MAX_TEMPO;

/// Clamp `value` into `range` and store it; non-finite writes are ignored
///
/// Returns true when the stored value changed.
fn write_clamped(slot: &mut f32, value: f32, range: (f32, f32), name: &str) -> bool {
    if !value.is_finite() {
        log::debug!("{}: ignoring non-finite value", name);
        return false;
    }
    let clamped = value.clamp(range.0, range.1);
    if clamped != value {
        log::debug!("{}: {} clamped to {}", name, value, clamped);
    }
    let changed = *slot != clamped;
    *slot = clamped;
    changed
}

fn write_clamped_f64(slot: &mut f64, value: f64, range: (f64, f64), name: &str) -> bool {
    if !value.is_finite() {
        log::debug!("{}: ignoring non-finite value", name);
        return false;
    }
    let clamped = value.clamp(range.0, range.1);
    if clamped != value {
        log::debug!("{}: {} clamped to {}", name, value, clamped);
    }
    let changed = *slot != clamped;
    *slot = clamped;
    changed
}

// ═══════════════════════════════════════════════════════════════════════════════
// Effects
// ═══════════════════════════════════════════════════════════════════════════════

/// Settings of every effect stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectParameters {
    bass_boost_db: f32,
    bass_frequency_hz: f32,
    sub_harmonic: f32,
    exciter: f32,
    compressor_threshold_db: f32,
    compressor_ratio: f32,
    compressor_attack_ms: f32,
    compressor_release_ms: f32,
    compressor_makeup_db: f32,
    compressor_knee_db: f32,
    limiter_threshold_db: f32,
    limiter_ceiling_db: f32,
    limiter_release_ms: f32,
}

impl Default for EffectParameters {
    fn default() -> Self {
        Self {
            bass_boost_db: 0.0,
            bass_frequency_hz: DEFAULT_BASS_FREQUENCY_HZ,
            sub_harmonic: 0.0,
            exciter: 0.0,
            compressor_threshold_db: compressor::DEFAULT_THRESHOLD_DB,
            compressor_ratio: compressor::DEFAULT_RATIO,
            compressor_attack_ms: compressor::DEFAULT_ATTACK_MS,
            compressor_release_ms: compressor::DEFAULT_RELEASE_MS,
            compressor_makeup_db: compressor::DEFAULT_MAKEUP_DB,
            compressor_knee_db: 0.0,
            limiter_threshold_db: limiter::DEFAULT_THRESHOLD_DB,
            limiter_ceiling_db: limiter::DEFAULT_CEILING_DB,
            limiter_release_ms: limiter::DEFAULT_RELEASE_MS,
        }
    }
}

impl EffectParameters {
    pub fn set_bass_boost_db(&mut self, db: f32) -> bool {
        write_clamped(&mut self.bass_boost_db, db, (0.0, MAX_BASS_BOOST_DB), "bass_boost_db")
    }

    pub fn set_bass_frequency_hz(&mut self, hz: f32) -> bool {
        write_clamped(
            &mut self.bass_frequency_hz,
            hz,
            (MIN_BASS_FREQUENCY_HZ, MAX_BASS_FREQUENCY_HZ),
            "bass_frequency_hz",
        )
    }

    pub fn set_sub_harmonic(&mut self, amount: f32) -> bool {
        write_clamped(&mut self.sub_harmonic, amount, (0.0, 1.0), "sub_harmonic")
    }

    pub fn set_exciter(&mut self, amount: f32) -> bool {
        write_clamped(&mut self.exciter, amount, (0.0, 1.0), "exciter")
    }

    pub fn set_compressor_threshold_db(&mut self, db: f32) -> bool {
        write_clamped(
            &mut self.compressor_threshold_db,
            db,
            compressor::THRESHOLD_RANGE_DB,
            "compressor_threshold_db",
        )
    }

    pub fn set_compressor_ratio(&mut self, ratio: f32) -> bool {
        write_clamped(
            &mut self.compressor_ratio,
            ratio,
            compressor::RATIO_RANGE,
            "compressor_ratio",
        )
    }

    pub fn set_compressor_attack_ms(&mut self, ms: f32) -> bool {
        write_clamped(
            &mut self.compressor_attack_ms,
            ms,
            compressor::ATTACK_RANGE_MS,
            "compressor_attack_ms",
        )
    }

    pub fn set_compressor_release_ms(&mut self, ms: f32) -> bool {
        write_clamped(
            &mut self.compressor_release_ms,
            ms,
            compressor::RELEASE_RANGE_MS,
            "compressor_release_ms",
        )
    }

    pub fn set_compressor_makeup_db(&mut self, db: f32) -> bool {
        write_clamped(
            &mut self.compressor_makeup_db,
            db,
            compressor::MAKEUP_RANGE_DB,
            "compressor_makeup_db",
        )
    }

    pub fn set_compressor_knee_db(&mut self, db: f32) -> bool {
        write_clamped(
            &mut self.compressor_knee_db,
            db,
            compressor::KNEE_RANGE_DB,
            "compressor_knee_db",
        )
    }

    pub fn set_limiter_threshold_db(&mut self, db: f32) -> bool {
        write_clamped(
            &mut self.limiter_threshold_db,
            db,
            limiter::THRESHOLD_RANGE_DB,
            "limiter_threshold_db",
        )
    }

    pub fn set_limiter_ceiling_db(&mut self, db: f32) -> bool {
        write_clamped(
            &mut self.limiter_ceiling_db,
            db,
            limiter::CEILING_RANGE_DB,
            "limiter_ceiling_db",
        )
    }

    pub fn set_limiter_release_ms(&mut self, ms: f32) -> bool {
        write_clamped(
            &mut self.limiter_release_ms,
            ms,
            limiter::RELEASE_RANGE_MS,
            "limiter_release_ms",
        )
    }

    pub fn bass_boost_db(&self) -> f32 {
        self.bass_boost_db
    }

    pub fn bass_frequency_hz(&self) -> f32 {
        self.bass_frequency_hz
    }

    pub fn sub_harmonic(&self) -> f32 {
        self.sub_harmonic
    }

    pub fn exciter(&self) -> f32 {
        self.exciter
    }

    pub fn compressor_threshold_db(&self) -> f32 {
        self.compressor_threshold_db
    }

    pub fn compressor_ratio(&self) -> f32 {
        self.compressor_ratio
    }

    pub fn compressor_attack_ms(&self) -> f32 {
        self.compressor_attack_ms
    }

    pub fn compressor_release_ms(&self) -> f32 {
        self.compressor_release_ms
    }

    pub fn compressor_makeup_db(&self) -> f32 {
        self.compressor_makeup_db
    }

    pub fn compressor_knee_db(&self) -> f32 {
        self.compressor_knee_db
    }

    pub fn limiter_threshold_db(&self) -> f32 {
        self.limiter_threshold_db
    }

    pub fn limiter_ceiling_db(&self) -> f32 {
        self.limiter_ceiling_db
    }

    pub fn limiter_release_ms(&self) -> f32 {
        self.limiter_release_ms
    }

    /// Re-run every value through its setter
    ///
    /// Used on deserialized values, which bypass the setters. Non-finite
    /// fields fall back to their defaults.
    pub fn sanitized(&self) -> Self {
        let mut clean = Self::default();
        clean.set_bass_boost_db(self.bass_boost_db);
        clean.set_bass_frequency_hz(self.bass_frequency_hz);
        clean.set_sub_harmonic(self.sub_harmonic);
        clean.set_exciter(self.exciter);
        clean.set_compressor_threshold_db(self.compressor_threshold_db);
        clean.set_compressor_ratio(self.compressor_ratio);
        clean.set_compressor_attack_ms(self.compressor_attack_ms);
        clean.set_compressor_release_ms(self.compressor_release_ms);
        clean.set_compressor_makeup_db(self.compressor_makeup_db);
        clean.set_compressor_knee_db(self.compressor_knee_db);
        clean.set_limiter_threshold_db(self.limiter_threshold_db);
        clean.set_limiter_ceiling_db(self.limiter_ceiling_db);
        clean.set_limiter_release_ms(self.limiter_release_ms);
        clean
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tempo / pitch
// ═══════════════════════════════════════════════════════════════════════════════

/// Speed, pitch and rate controls
///
/// Speed and pitch are independent. Rate drives both together; setting it
/// enters rate mode, and setting speed or pitch leaves it again with the
/// stored speed and pitch intact. Formant preservation applies in both modes
/// on engines that support it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StretchParameters {
    speed: f64,
    pitch_semitones: f64,
    rate: f64,
    rate_mode: bool,
    formant_preservation: bool,
}

impl Default for StretchParameters {
    fn default() -> Self {
        Self {
            speed: 1.0,
            pitch_semitones: 0.0,
            rate: 1.0,
            rate_mode: false,
            formant_preservation: true,
        }
    }
}

impl StretchParameters {
    pub fn set_speed(&mut self, speed: f64) -> bool {
        if !speed.is_finite() {
            log::debug!("speed: ignoring non-finite value");
            return false;
        }
        let was_rate = std::mem::replace(&mut self.rate_mode, false);
        write_clamped_f64(&mut self.speed, speed, (MIN_TEMPO, MAX_TEMPO), "speed") || was_rate
    }

    pub fn set_pitch_semitones(&mut self, semitones: f64) -> bool {
        if !semitones.is_finite() {
            log::debug!("pitch_semitones: ignoring non-finite value");
            return false;
        }
        let was_rate = std::mem::replace(&mut self.rate_mode, false);
        write_clamped_f64(
            &mut self.pitch_semitones,
            semitones,
            (MIN_PITCH_SEMITONES, MAX_PITCH_SEMITONES),
            "pitch_semitones",
        ) || was_rate
    }

    /// Pitch as a frequency ratio; non-positive ratios are ignored
    pub fn set_pitch_ratio(&mut self, ratio: f64) -> bool {
        if !(ratio.is_finite() && ratio > 0.0) {
            log::debug!("pitch_ratio: ignoring {}", ratio);
            return false;
        }
        self.set_pitch_semitones(ratio_to_semitones(ratio))
    }

    /// Varispeed: tempo and pitch ratio both follow `rate`
    pub fn set_rate(&mut self, rate: f64) -> bool {
        if !rate.is_finite() {
            log::debug!("rate: ignoring non-finite value");
            return false;
        }
        let was_rate = std::mem::replace(&mut self.rate_mode, true);
        write_clamped_f64(&mut self.rate, rate, (MIN_RATE, MAX_RATE), "rate") || !was_rate
    }

    pub fn set_formant_preservation(&mut self, enabled: bool) -> bool {
        std::mem::replace(&mut self.formant_preservation, enabled) != enabled
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn pitch_semitones(&self) -> f64 {
        self.pitch_semitones
    }

    pub fn pitch_ratio(&self) -> f64 {
        semitones_to_ratio(self.pitch_semitones)
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn is_rate_mode(&self) -> bool {
        self.rate_mode
    }

    pub fn formant_preservation(&self) -> bool {
        self.formant_preservation
    }

    /// Ratios the engines should run at
    pub fn effective(&self) -> StretchSettings {
        let (tempo, pitch_ratio) = if self.rate_mode {
            (self.rate, self.rate)
        } else {
            (self.speed, self.pitch_ratio())
        };
        StretchSettings {
            tempo,
            pitch_ratio,
            formant_preservation: self.formant_preservation,
        }
    }

    pub fn sanitized(&self) -> Self {
        let mut clean = Self::default();
        clean.set_rate(self.rate);
        clean.set_speed(self.speed);
        clean.set_pitch_semitones(self.pitch_semitones);
        clean.rate_mode = self.rate_mode;
        clean.formant_preservation = self.formant_preservation;
        clean
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Full snapshot
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything the audio thread needs to run the chain
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainParameters {
    pub effects: EffectParameters,
    pub stretch: StretchParameters,
    pub profile: OperatingProfile,
}

impl ChainParameters {
    /// Switch audiophile mode; turning it on zeroes the coloration amounts
    pub fn set_audiophile_mode(&mut self, enabled: bool) -> bool {
        let changed = self.profile.audiophile_mode != enabled;
        self.profile.audiophile_mode = enabled;
        if enabled {
            let sub = self.effects.set_sub_harmonic(0.0);
            let exciter = self.effects.set_exciter(0.0);
            return changed || sub || exciter;
        }
        changed
    }

    /// Clamp every field and re-apply the audiophile rules
    pub fn sanitized(&self) -> Self {
        let mut clean = Self {
            effects: self.effects.sanitized(),
            stretch: self.stretch.sanitized(),
            profile: self.profile,
        };
        clean.set_audiophile_mode(self.profile.audiophile_mode);
        clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effect_defaults() {
        let params = EffectParameters::default();
        assert_eq!(params.bass_boost_db(), 0.0);
        assert_eq!(params.bass_frequency_hz(), 80.0);
        assert_eq!(params.compressor_threshold_db(), -12.0);
        assert_eq!(params.compressor_ratio(), 4.0);
        assert_eq!(params.compressor_makeup_db(), 6.0);
        assert_eq!(params.compressor_knee_db(), 0.0);
        assert_eq!(params.limiter_threshold_db(), -0.3);
        assert_eq!(params.limiter_ceiling_db(), -0.1);
        assert_eq!(params.limiter_release_ms(), 100.0);
    }

    #[test]
    fn test_setters_clamp() {
        let mut params = EffectParameters::default();
        params.set_bass_boost_db(40.0);
        params.set_bass_frequency_hz(5.0);
        params.set_sub_harmonic(-1.0);
        params.set_compressor_ratio(100.0);
        params.set_compressor_attack_ms(0.0);
        params.set_limiter_ceiling_db(3.0);

        assert_eq!(params.bass_boost_db(), 24.0);
        assert_eq!(params.bass_frequency_hz(), 20.0);
        assert_eq!(params.sub_harmonic(), 0.0);
        assert_eq!(params.compressor_ratio(), 20.0);
        assert_eq!(params.compressor_attack_ms(), 0.1);
        assert_eq!(params.limiter_ceiling_db(), 0.0);
    }

    #[test]
    fn test_non_finite_writes_are_ignored() {
        let mut params = EffectParameters::default();
        params.set_bass_boost_db(6.0);
        assert!(!params.set_bass_boost_db(f32::NAN));
        assert!(!params.set_limiter_release_ms(f32::INFINITY));
        assert_eq!(params.bass_boost_db(), 6.0);
        assert_eq!(params.limiter_release_ms(), 100.0);
    }

    #[test]
    fn test_repeated_write_reports_no_change() {
        let mut params = EffectParameters::default();
        assert!(params.set_exciter(0.5));
        assert!(!params.set_exciter(0.5));
    }

    #[test]
    fn test_rate_mode_overrides_speed_and_pitch() {
        let mut stretch = StretchParameters::default();
        stretch.set_speed(1.5);
        stretch.set_pitch_semitones(3.0);
        stretch.set_rate(2.0);

        assert!(stretch.is_rate_mode());
        let settings = stretch.effective();
        assert_eq!(settings.tempo, 2.0);
        assert_eq!(settings.pitch_ratio, 2.0);

        // Leaving rate mode restores the independent controls
        stretch.set_speed(1.5);
        assert!(!stretch.is_rate_mode());
        let settings = stretch.effective();
        assert_eq!(settings.tempo, 1.5);
        assert!((settings.pitch_ratio - semitones_to_ratio(3.0)).abs() < 1e-12);
    }

    #[test]
    fn test_pitch_ratio_and_semitones_agree() {
        let mut stretch = StretchParameters::default();
        stretch.set_pitch_ratio(2.0);
        assert!((stretch.pitch_semitones() - 12.0).abs() < 1e-9);

        assert!(!stretch.set_pitch_ratio(0.0));
        assert!(!stretch.set_pitch_ratio(-1.0));
        assert!((stretch.pitch_semitones() - 12.0).abs() < 1e-9);

        stretch.set_pitch_semitones(100.0);
        assert_eq!(stretch.pitch_semitones(), 36.0);
    }

    #[test]
    fn test_stretch_ranges() {
        let mut stretch = StretchParameters::default();
        stretch.set_speed(0.0);
        assert_eq!(stretch.speed(), 0.05);
        stretch.set_speed(25.0);
        assert_eq!(stretch.speed(), 10.0);
        stretch.set_rate(20.0);
        assert_eq!(stretch.rate(), MAX_RATE);
    }

    #[test]
    fn test_rate_covers_tempo_range() {
        let mut stretch = StretchParameters::default();
        stretch.set_rate(10.0);
        assert_eq!(stretch.rate(), 10.0);
        let settings = stretch.effective().clamped();
        assert_eq!((settings.tempo, settings.pitch_ratio), (10.0, 10.0));

        stretch.set_rate(0.05);
        assert_eq!(stretch.rate(), 0.05);
        let settings = stretch.effective().clamped();
        assert_eq!((settings.tempo, settings.pitch_ratio), (0.05, 0.05));

        stretch.set_rate(0.01);
        assert_eq!(stretch.rate(), MIN_RATE);
    }

    #[test]
    fn test_formant_preservation_flag() {
        let mut stretch = StretchParameters::default();
        assert!(stretch.formant_preservation());
        assert!(stretch.effective().formant_preservation);

        assert!(stretch.set_formant_preservation(false));
        assert!(!stretch.set_formant_preservation(false));
        assert!(!stretch.effective().formant_preservation);

        // Independent of rate mode
        stretch.set_rate(2.0);
        assert!(!stretch.effective().formant_preservation);
        assert!(!stretch.sanitized().formant_preservation());
    }

    #[test]
    fn test_audiophile_zeroes_coloration() {
        let mut params = ChainParameters::default();
        params.effects.set_sub_harmonic(0.7);
        params.effects.set_exciter(0.4);

        assert!(params.set_audiophile_mode(true));
        assert_eq!(params.effects.sub_harmonic(), 0.0);
        assert_eq!(params.effects.exciter(), 0.0);

        // Amounts stay zero after leaving audiophile mode
        params.set_audiophile_mode(false);
        assert_eq!(params.effects.sub_harmonic(), 0.0);
        assert_eq!(params.effects.exciter(), 0.0);
    }

    #[test]
    fn test_sanitized_clamps_deserialized_values() {
        let yaml = "effects:\n  bass_boost_db: 99.0\n  limiter_ceiling_db: 5.0\nstretch:\n  speed: 0.0\n";
        let params: ChainParameters = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(params.effects.bass_boost_db(), 99.0);

        let clean = params.sanitized();
        assert_eq!(clean.effects.bass_boost_db(), 24.0);
        assert_eq!(clean.effects.limiter_ceiling_db(), 0.0);
        assert_eq!(clean.stretch.speed(), 0.05);
        assert_eq!(clean.effects.compressor_ratio(), 4.0);
    }
}
