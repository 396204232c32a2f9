//! Reference back-end: two-pass linear interpolation
//!
//! Always available and dependency-free. Quality is intentionally modest, but
//! it never fails to produce output.
//!
//! # Passes
//!
//! 1. **Tempo**: a streaming linear-interpolation resampler stepping through
//!    the input at `tempo` frames per output frame. `N` input frames become
//!    `ceil(N / tempo)` output frames, and every frequency is scaled by `tempo`.
//! 2. **Pitch**: a length-preserving linear-interpolation resampler keyed on
//!    `pitch / tempo`. A read tap sweeps a delay line at that speed and
//!    splices back by whole periods when it runs out of room, so the
//!    frequency scale is corrected to `pitch` without changing the length.
//!
//! In rate mode `tempo == pitch`, the second pass is an exact pass-through and
//! the engine is a plain varispeed.
//!
//! Formant preservation is not supported: the flag is stored and reported
//! back but has no effect on the output.

use super::{
    input_room_for, EngineDescriptor, EngineKind, FrameFifo, QualityTier, StretchSettings,
    TimeStretchEngine, MAX_EXPANSION,
};
use crate::error::{ChainError, ChainResult};
use crate::types::{Sample, MAX_CHANNELS};

/// Shortest splice jump of the pitch pass
const MIN_JUMP_MS: f64 = 20.0;
/// Longest splice jump of the pitch pass
const MAX_JUMP_MS: f64 = 40.0;
/// History compared when choosing a splice point
const CORRELATION_MS: f64 = 10.0;
/// Longest splice crossfade
const MAX_FADE_MS: f64 = 5.0;
/// Pitch pass ratios this close to 1.0 bypass the delay taps
const BYPASS_EPSILON: f64 = 1e-6;

// ═══════════════════════════════════════════════════════════════════════════════
// Tempo pass
// ═══════════════════════════════════════════════════════════════════════════════

/// Streaming linear-interpolation resampler
///
/// `position` is the fractional read position measured from `previous`
/// (0.0) towards the incoming frame (1.0).
struct LinearResampler {
    step: f64,
    position: f64,
    previous: [Sample; MAX_CHANNELS],
    primed: bool,
    channels: usize,
}

impl LinearResampler {
    fn new(channels: usize) -> Self {
        Self {
            step: 1.0,
            position: 0.0,
            previous: [0.0; MAX_CHANNELS],
            primed: false,
            channels,
        }
    }

    fn set_step(&mut self, step: f64) {
        self.step = step;
    }

    /// Consume one input frame, emitting every output frame that falls
    /// between the previous frame and this one
    #[inline]
    fn push_frame<F>(&mut self, frame: &[Sample], emit: &mut F)
    where
        F: FnMut(&[Sample]),
    {
        let channels = self.channels;
        if !self.primed {
            self.previous[..channels].copy_from_slice(&frame[..channels]);
            self.primed = true;
            self.position = 0.0;
            return;
        }

        let mut out = [0.0; MAX_CHANNELS];
        while self.position < 1.0 {
            let frac = self.position as Sample;
            for ch in 0..channels {
                out[ch] = self.previous[ch] + frac * (frame[ch] - self.previous[ch]);
            }
            emit(&out[..channels]);
            self.position += self.step;
        }
        self.position -= 1.0;
        self.previous[..channels].copy_from_slice(&frame[..channels]);
    }

    /// Emit the output frames that fall inside the last input frame
    fn flush<F>(&mut self, emit: &mut F)
    where
        F: FnMut(&[Sample]),
    {
        if self.primed {
            while self.position < 1.0 {
                emit(&self.previous[..self.channels]);
                self.position += self.step;
            }
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.position = 0.0;
        self.previous = [0.0; MAX_CHANNELS];
        self.primed = false;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Pitch pass
// ═══════════════════════════════════════════════════════════════════════════════

/// Length-preserving linear-interpolation resampler
///
/// A single read tap sweeps a delay line at `ratio` input frames per output
/// frame. When it runs out of room it splices back (or forward) by a jump
/// chosen from a correlation search, so the splice lands a whole number of
/// periods away and the waveform continues in phase. A short linear
/// crossfade covers the splice.
struct SplicePitchShifter {
    ratio: f64,
    /// Interleaved ring buffer, `ring_len` frames
    delay: Vec<Sample>,
    ring_len: usize,
    write_pos: usize,
    channels: usize,
    /// Delay of the active tap in frames behind the newest frame
    tap: f64,
    /// Delay of the tap being faded out
    fade_tap: f64,
    fade_len: usize,
    fade_remaining: usize,
    min_jump: usize,
    max_jump: usize,
    correlation_len: usize,
    max_fade: usize,
    /// Stride of the correlation search at high sample rates
    decimation: usize,
}

impl SplicePitchShifter {
    fn new(channels: usize) -> Self {
        Self {
            ratio: 1.0,
            delay: Vec::new(),
            ring_len: 0,
            write_pos: 0,
            channels,
            tap: 0.0,
            fade_tap: 0.0,
            fade_len: 0,
            fade_remaining: 0,
            min_jump: 0,
            max_jump: 0,
            correlation_len: 0,
            max_fade: 0,
            decimation: 1,
        }
    }

    fn configure(&mut self, sample_rate: u32, channels: usize) {
        let frames = |ms: f64| ((ms * sample_rate as f64 / 1000.0).round() as usize).max(4);
        self.channels = channels;
        self.min_jump = frames(MIN_JUMP_MS);
        self.max_jump = frames(MAX_JUMP_MS);
        self.correlation_len = frames(CORRELATION_MS);
        self.max_fade = frames(MAX_FADE_MS);
        self.decimation = (sample_rate / 22050).max(1) as usize;
        self.ring_len = (2 * self.max_jump + self.correlation_len + 16).next_power_of_two();
        self.delay = vec![0.0; self.ring_len * channels];
        self.reset();
    }

    fn set_ratio(&mut self, ratio: f64) {
        self.ratio = ratio;
    }

    #[inline]
    fn is_bypassed(&self) -> bool {
        (self.ratio - 1.0).abs() < BYPASS_EPSILON
    }

    fn latency_frames(&self) -> usize {
        if self.is_bypassed() {
            0
        } else {
            self.tap as usize
        }
    }

    /// Largest tap delay that leaves room for reading and correlating
    fn max_tap(&self) -> f64 {
        (self.ring_len - self.correlation_len - 4) as f64
    }

    #[inline]
    fn index(&self, delay: usize) -> usize {
        (self.write_pos + self.ring_len - delay) & (self.ring_len - 1)
    }

    /// Linear interpolation `delay` frames behind the newest frame
    #[inline]
    fn read(&self, channel: usize, delay: f64) -> Sample {
        let delay = delay.clamp(0.0, (self.ring_len - 2) as f64);
        let whole = delay.floor();
        let frac = (delay - whole) as Sample;
        let newer = self.index(whole as usize);
        let older = self.index(whole as usize + 1);
        let a = self.delay[newer * self.channels + channel];
        let b = self.delay[older * self.channels + channel];
        a + (b - a) * frac
    }

    /// Channel sum at an integer delay
    #[inline]
    fn mono(&self, delay: usize) -> f32 {
        let base = self.index(delay) * self.channels;
        self.delay[base..base + self.channels].iter().sum()
    }

    /// Normalized correlation of the history behind two delays
    fn correlation(&self, a: usize, b: usize) -> f32 {
        let (mut ab, mut aa, mut bb) = (0.0f32, 0.0f32, 0.0f32);
        for s in (0..self.correlation_len).step_by(self.decimation) {
            let x = self.mono(a + s);
            let y = self.mono(b + s);
            ab += x * y;
            aa += x * x;
            bb += y * y;
        }
        let energy = aa * bb;
        if energy <= 1e-12 {
            0.0
        } else {
            ab / energy.sqrt()
        }
    }

    /// Jump size (frames) whose destination best matches the current tap
    fn find_jump(&self, backwards: bool) -> f64 {
        let base = self.tap.max(0.0) as usize;
        let target = |jump: usize| if backwards { base + jump } else { base - jump };

        let coarse_step =
            self.decimation * ((self.ratio - 1.0).abs() / 2.0).ceil().max(1.0) as usize;
        let mut best = (self.min_jump, f32::MIN);
        for jump in (self.min_jump..=self.max_jump).step_by(coarse_step) {
            let score = self.correlation(base, target(jump));
            if score > best.1 {
                best = (jump, score);
            }
        }
        if best.1 <= 0.0 {
            return ((self.min_jump + self.max_jump) / 2) as f64;
        }

        let lo = best.0.saturating_sub(coarse_step).max(self.min_jump);
        let hi = (best.0 + coarse_step).min(self.max_jump);
        for jump in lo..=hi {
            let score = self.correlation(base, target(jump));
            if score > best.1 {
                best = (jump, score);
            }
        }

        // Parabolic refinement of the peak to a fractional jump
        let (jump, score) = best;
        if jump > self.min_jump && jump < self.max_jump {
            let before = self.correlation(base, target(jump - 1));
            let after = self.correlation(base, target(jump + 1));
            let curvature = before - 2.0 * score + after;
            if curvature < 0.0 {
                let offset = 0.5 * (before - after) / curvature;
                if offset.abs() < 1.0 {
                    return jump as f64 + offset as f64;
                }
            }
        }
        jump as f64
    }

    /// Start a splice if the active tap is about to leave the delay line
    fn maybe_splice(&mut self) {
        let drift = (self.ratio - 1.0).abs();
        let fade = ((self.min_jump as f64 / (2.0 * drift)) as usize).clamp(1, self.max_fade);
        let margin = drift * fade as f64;

        let jump = if self.ratio > 1.0 && self.tap < 2.0 + margin {
            self.find_jump(true)
        } else if self.ratio < 1.0 && self.tap > self.max_tap() - margin {
            -self.find_jump(false)
        } else {
            return;
        };

        self.fade_tap = self.tap;
        self.tap += jump;
        self.fade_len = fade;
        self.fade_remaining = fade;
    }

    fn process_frame(&mut self, input: &[Sample], output: &mut [Sample]) {
        let channels = self.channels;
        let base = self.write_pos * channels;
        self.delay[base..base + channels].copy_from_slice(&input[..channels]);

        if self.is_bypassed() {
            output[..channels].copy_from_slice(&input[..channels]);
        } else {
            if self.fade_remaining == 0 {
                self.maybe_splice();
            }

            if self.fade_remaining > 0 {
                let t = 1.0 - self.fade_remaining as Sample / self.fade_len as Sample;
                for ch in 0..channels {
                    let old = self.read(ch, self.fade_tap);
                    let new = self.read(ch, self.tap);
                    output[ch] = old + (new - old) * t;
                }
                self.fade_remaining -= 1;
            } else {
                for ch in 0..channels {
                    output[ch] = self.read(ch, self.tap);
                }
            }

            // Reading at `ratio` while the writer advances by one frame
            let drift = 1.0 - self.ratio;
            self.tap = (self.tap + drift).clamp(0.0, self.max_tap());
            self.fade_tap = (self.fade_tap + drift).max(0.0);
        }

        self.write_pos = (self.write_pos + 1) & (self.ring_len - 1);
    }

    fn reset(&mut self) {
        self.delay.fill(0.0);
        self.write_pos = 0;
        self.tap = self.max_jump as f64;
        self.fade_tap = self.tap;
        self.fade_len = 0;
        self.fade_remaining = 0;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Engine
// ═══════════════════════════════════════════════════════════════════════════════

/// Always-available fallback back-end
pub struct ReferenceEngine {
    descriptor: EngineDescriptor,
    settings: StretchSettings,
    tempo_pass: LinearResampler,
    pitch_pass: SplicePitchShifter,
    fifo: FrameFifo,
    channels: usize,
    configured: bool,
}

impl ReferenceEngine {
    pub fn new() -> Self {
        Self {
            descriptor: EngineDescriptor::new(EngineKind::Reference, QualityTier::Basic, true),
            settings: StretchSettings::default(),
            tempo_pass: LinearResampler::new(MAX_CHANNELS),
            pitch_pass: SplicePitchShifter::new(MAX_CHANNELS),
            fifo: FrameFifo::new(1, MAX_CHANNELS),
            channels: MAX_CHANNELS,
            configured: false,
        }
    }

    fn apply_settings(&mut self) {
        self.tempo_pass.set_step(self.settings.tempo);
        self.pitch_pass
            .set_ratio(self.settings.pitch_ratio / self.settings.tempo);
    }
}

impl Default for ReferenceEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeStretchEngine for ReferenceEngine {
    fn descriptor(&self) -> &EngineDescriptor {
        &self.descriptor
    }

    fn configure(
        &mut self,
        sample_rate: u32,
        channels: usize,
        max_block_frames: usize,
    ) -> ChainResult<()> {
        if !self.descriptor.supports_sample_rate(sample_rate) {
            return Err(ChainError::EngineSampleRate {
                engine: self.descriptor.name(),
                sample_rate,
            });
        }
        self.channels = channels;
        self.tempo_pass = LinearResampler::new(channels);
        self.pitch_pass.configure(sample_rate, channels);
        self.fifo = FrameFifo::new(max_block_frames * (MAX_EXPANSION + 4), channels);
        self.apply_settings();
        self.configured = true;
        Ok(())
    }

    fn set_settings(&mut self, settings: StretchSettings) {
        self.settings = settings.clamped();
        self.apply_settings();
    }

    fn settings(&self) -> StretchSettings {
        self.settings
    }

    fn input_room(&self) -> usize {
        if !self.configured {
            return 0;
        }
        input_room_for(self.fifo.free_frames(), self.settings.tempo)
    }

    fn can_flush(&self) -> bool {
        // The tempo pass emits at most `1 / tempo + 1` frames from its last input
        let tail = (1.0 / self.settings.tempo).ceil() as usize + 2;
        self.fifo.free_frames() >= tail
    }

    fn push(&mut self, input: &[Sample]) {
        if !self.configured {
            return;
        }
        let channels = self.channels;
        let Self {
            tempo_pass,
            pitch_pass,
            fifo,
            ..
        } = self;

        let mut emit = |frame: &[Sample]| {
            let mut shifted = [0.0; MAX_CHANNELS];
            pitch_pass.process_frame(frame, &mut shifted[..channels]);
            fifo.write_frame(&shifted[..channels]);
        };
        for frame in input.chunks_exact(channels) {
            tempo_pass.push_frame(frame, &mut emit);
        }
    }

    fn pull(&mut self, output: &mut [Sample]) -> usize {
        self.fifo.read_into(output)
    }

    fn available_frames(&self) -> usize {
        self.fifo.available_frames()
    }

    fn flush(&mut self) {
        if !self.configured {
            return;
        }
        let channels = self.channels;
        let Self {
            tempo_pass,
            pitch_pass,
            fifo,
            ..
        } = self;

        tempo_pass.flush(&mut |frame: &[Sample]| {
            let mut shifted = [0.0; MAX_CHANNELS];
            pitch_pass.process_frame(frame, &mut shifted[..channels]);
            fifo.write_frame(&shifted[..channels]);
        });
    }

    fn clear(&mut self) {
        self.tempo_pass.reset();
        self.pitch_pass.reset();
        self.fifo.clear();
    }

    fn latency_frames(&self) -> usize {
        self.pitch_pass.latency_frames()
    }

    fn dropped_frames(&self) -> u64 {
        self.fifo.dropped_frames()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::timestretch::semitones_to_ratio;
    use std::f64::consts::PI;

    const SR: u32 = 44100;

    pub(crate) fn mono_sine(frames: usize, freq: f64) -> Vec<Sample> {
        (0..frames)
            .map(|i| (0.5 * (2.0 * PI * freq * i as f64 / SR as f64).sin()) as Sample)
            .collect()
    }

    /// Frequency of the strongest component within ±10% of `expected`
    pub(crate) fn dominant_frequency(samples: &[Sample], expected: f64) -> f64 {
        let n = samples.len();
        let windowed: Vec<f64> = samples
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                let hann = 0.5 - 0.5 * (2.0 * PI * i as f64 / (n - 1) as f64).cos();
                s as f64 * hann
            })
            .collect();

        let mut best = (expected, 0.0);
        for step in 0..=400 {
            let freq = expected * (0.9 + 0.2 * step as f64 / 400.0);
            let w = 2.0 * PI * freq / SR as f64;
            let (mut re, mut im) = (0.0, 0.0);
            for (i, &s) in windowed.iter().enumerate() {
                let (sin, cos) = (w * i as f64).sin_cos();
                re += s * cos;
                im += s * sin;
            }
            let magnitude = re * re + im * im;
            if magnitude > best.1 {
                best = (freq, magnitude);
            }
        }
        best.0
    }

    /// Push `input` in blocks, pulling after each, then flush and drain
    pub(crate) fn run_engine(
        engine: &mut dyn TimeStretchEngine,
        input: &[Sample],
        channels: usize,
    ) -> Vec<Sample> {
        let block = 1024 * channels;
        let mut scratch = vec![0.0; block * (MAX_EXPANSION + 1)];
        let mut output = Vec::new();

        fn drain(
            engine: &mut dyn TimeStretchEngine,
            scratch: &mut [Sample],
            channels: usize,
            output: &mut Vec<Sample>,
        ) {
            loop {
                let frames = engine.pull(scratch);
                if frames == 0 {
                    break;
                }
                output.extend_from_slice(&scratch[..frames * channels]);
            }
        }

        for chunk in input.chunks(block) {
            engine.push(chunk);
            drain(engine, &mut scratch, channels, &mut output);
        }
        engine.flush();
        drain(engine, &mut scratch, channels, &mut output);
        output
    }

    fn configured(settings: StretchSettings, channels: usize) -> ReferenceEngine {
        let mut engine = ReferenceEngine::new();
        engine.configure(SR, channels, 8192).unwrap();
        engine.set_settings(settings);
        engine
    }

    #[test]
    fn test_output_length_tracks_tempo() {
        for tempo in [0.05, 0.1, 0.33, 0.5, 0.73, 1.0, 1.5, 2.0, 4.2, 7.0, 10.0] {
            for n in [1000usize, 4410, 8192] {
                let mut engine = configured(StretchSettings::new(tempo, 1.0), 2);
                let input: Vec<Sample> = mono_sine(n, 440.0)
                    .into_iter()
                    .flat_map(|s| [s, -s])
                    .collect();

                let frames = run_engine(&mut engine, &input, 2).len() / 2;
                let expected = (n as f64 / tempo).round() as i64;
                assert!(
                    (frames as i64 - expected).abs() <= 1,
                    "tempo {} n {}: got {} frames, expected {}",
                    tempo,
                    n,
                    frames,
                    expected
                );
                assert_eq!(engine.dropped_frames(), 0);
            }
        }
    }

    #[test]
    fn test_unity_settings_are_transparent() {
        let mut engine = configured(StretchSettings::default(), 1);
        let input = mono_sine(5000, 220.0);
        let output = run_engine(&mut engine, &input, 1);
        assert_eq!(output, input);
        assert_eq!(engine.latency_frames(), 0);
    }

    #[test]
    fn test_pitch_shift_moves_fundamental() {
        for semitones in [12.0, -12.0, 7.0] {
            let ratio = semitones_to_ratio(semitones);
            let mut engine = configured(StretchSettings::new(1.0, ratio), 1);
            let input = mono_sine(44100, 220.0);
            let output = run_engine(&mut engine, &input, 1);
            assert_eq!(output.len(), input.len());

            let expected = 220.0 * ratio;
            let measured = dominant_frequency(&output[8192..8192 + 16384], expected);
            assert!(
                (measured - expected).abs() / expected < 0.01,
                "{} semitones: measured {}Hz expected {}Hz",
                semitones,
                measured,
                expected
            );
        }
    }

    #[test]
    fn test_pitch_round_trip_restores_fundamental() {
        for k in [1.0, 12.0, 24.0, 36.0] {
            let mut up = configured(StretchSettings::new(1.0, semitones_to_ratio(k)), 1);
            let mut down = configured(StretchSettings::new(1.0, semitones_to_ratio(-k)), 1);

            let input = mono_sine(66150, 220.0);
            let shifted = run_engine(&mut up, &input, 1);
            let restored = run_engine(&mut down, &shifted, 1);

            let measured = dominant_frequency(&restored[22050..22050 + 16384], 220.0);
            assert!(
                (measured - 220.0).abs() / 220.0 < 0.01,
                "±{} semitones: measured {}Hz",
                k,
                measured
            );
        }
    }

    #[test]
    fn test_tempo_change_keeps_pitch() {
        for tempo in [0.5, 2.0] {
            let mut engine = configured(StretchSettings::new(tempo, 1.0), 1);
            let output = run_engine(&mut engine, &mono_sine(88200, 220.0), 1);
            let measured = dominant_frequency(&output[8192..8192 + 16384], 220.0);
            assert!(
                (measured - 220.0).abs() / 220.0 < 0.01,
                "tempo {}: measured {}Hz",
                tempo,
                measured
            );
        }
    }

    #[test]
    fn test_rate_mode_is_varispeed() {
        let mut engine = configured(StretchSettings::new(2.0, 2.0), 1);
        assert_eq!(engine.latency_frames(), 0);

        let output = run_engine(&mut engine, &mono_sine(44100, 220.0), 1);
        assert!((output.len() as i64 - 22050).abs() <= 1);

        let measured = dominant_frequency(&output[..16384], 440.0);
        assert!((measured - 440.0).abs() / 440.0 < 0.01, "measured {}Hz", measured);
    }

    #[test]
    fn test_extreme_tempo_swing_stays_finite() {
        let mut engine = configured(StretchSettings::new(10.0, 1.0), 2);
        let input: Vec<Sample> = mono_sine(4096, 100.0)
            .into_iter()
            .flat_map(|s| [s, s])
            .collect();

        let fast = run_engine(&mut engine, &input, 2);
        engine.set_settings(StretchSettings::new(0.05, 1.0));
        let slow = run_engine(&mut engine, &input, 2);

        assert!(fast.iter().chain(&slow).all(|s| s.is_finite()));
        assert!(slow.len() > fast.len() * 100);
    }

    #[test]
    fn test_input_room_keeps_output_queue_from_overflowing() {
        let mut engine = ReferenceEngine::new();
        engine.configure(SR, 1, 256).unwrap();
        engine.set_settings(StretchSettings::new(0.05, 1.0));

        let input = mono_sine(256, 220.0);
        let mut pushed = 0;
        while engine.input_room() > 0 {
            let frames = engine.input_room().min(input.len());
            engine.push(&input[..frames]);
            pushed += frames;
        }
        assert!(pushed > 0);
        assert_eq!(engine.dropped_frames(), 0);

        let mut out = vec![0.0; 256 * 24];
        assert!(engine.pull(&mut out) > 0);
        assert!(engine.can_flush());
        engine.flush();
        assert_eq!(engine.dropped_frames(), 0);
    }

    #[test]
    fn test_formant_flag_is_reported_but_unsupported() {
        let mut engine = configured(StretchSettings::default(), 1);
        assert!(!engine.descriptor().formant_preservation);
        assert!(engine.settings().formant_preservation);

        engine.set_settings(StretchSettings {
            formant_preservation: false,
            ..StretchSettings::new(1.0, 2.0)
        });
        assert!(!engine.settings().formant_preservation);
    }

    #[test]
    fn test_clear_discards_buffered_audio() {
        let mut engine = configured(StretchSettings::default(), 2);
        engine.push(&[0.5; 512]);
        assert!(engine.available_frames() > 0);

        engine.clear();
        assert_eq!(engine.available_frames(), 0);

        let mut out = [1.0; 64];
        assert_eq!(engine.pull(&mut out), 0);
    }

    #[test]
    fn test_unconfigured_engine_produces_nothing() {
        let mut engine = ReferenceEngine::new();
        engine.push(&[0.5; 64]);
        let mut out = [0.0; 64];
        assert_eq!(engine.pull(&mut out), 0);
    }

    #[test]
    fn test_rejects_unsupported_sample_rate() {
        let mut engine = ReferenceEngine::new();
        assert!(engine.configure(4000, 2, 1024).is_err());
    }
}
