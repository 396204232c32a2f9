//! Signalsmith Stretch back-ends
//!
//! Premium runs the library's default preset, Balanced the cheaper one
//! (30-50% less CPU for slightly lower quality). The stretcher itself has no
//! notion of a tempo ratio: it maps whatever input length it gets onto
//! whatever output length it is asked for. Each pushed chunk is therefore
//! paired with an output length of `frames / tempo`, with the fractional
//! remainder carried into the next chunk so the long-run length is exact.
//! Pitch is applied independently through the transpose factor. With formant
//! preservation on, the transpose gets a tonality limit so the spectral
//! envelope above it stays in place and voices keep their character.

use signalsmith_stretch::Stretch;

use super::{
    input_room_for, ratio_to_semitones, EngineDescriptor, EngineKind, FrameFifo, QualityTier,
    StretchSettings, TimeStretchEngine, MAX_EXPANSION,
};
use crate::error::{ChainError, ChainResult};
use crate::types::{AudioBlock, Sample, DEFAULT_SAMPLE_RATE, MAX_CHANNELS};

/// Tonality limit used for formant preservation, in Hz
const FORMANT_TONALITY_LIMIT_HZ: f64 = 8000.0;

/// Which Signalsmith configuration a back-end runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalsmithPreset {
    /// Full quality
    Default,
    /// Shorter analysis blocks, faster
    Cheaper,
}

impl SignalsmithPreset {
    fn kind(self) -> EngineKind {
        match self {
            SignalsmithPreset::Default => EngineKind::Premium,
            SignalsmithPreset::Cheaper => EngineKind::Balanced,
        }
    }

    fn tier(self) -> QualityTier {
        match self {
            SignalsmithPreset::Default => QualityTier::Studio,
            SignalsmithPreset::Cheaper => QualityTier::Standard,
        }
    }

    fn build(self, channels: usize, sample_rate: u32) -> Stretch {
        match self {
            SignalsmithPreset::Default => Stretch::preset_default(channels as u32, sample_rate),
            SignalsmithPreset::Cheaper => Stretch::preset_cheaper(channels as u32, sample_rate),
        }
    }
}

/// Time-stretch back-end on top of signalsmith-stretch
///
/// The stretcher is created in `configure`, so an unconfigured engine holds
/// no library state and produces nothing.
pub struct SignalsmithEngine {
    descriptor: EngineDescriptor,
    preset: SignalsmithPreset,
    stretcher: Option<Stretch>,
    settings: StretchSettings,
    sample_rate: u32,
    /// Tonality limit last handed to the stretcher, as a fraction of the sample rate
    tonality_limit: Option<f32>,
    /// Output scratch for one chunk, sized for the largest expansion
    scratch: AudioBlock,
    /// Silence fed through at flush time to push out the input latency
    silence: Vec<Sample>,
    fifo: FrameFifo,
    channels: usize,
    max_block_frames: usize,
    /// Fractional output frames owed from previous chunks
    carry: f64,
}

impl SignalsmithEngine {
    /// Back-end for `preset`; `available` is false when disabled by configuration
    pub fn new(preset: SignalsmithPreset, available: bool) -> Self {
        Self {
            descriptor: EngineDescriptor {
                formant_preservation: true,
                ..EngineDescriptor::new(preset.kind(), preset.tier(), available)
            },
            preset,
            stretcher: None,
            settings: StretchSettings::default(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            tonality_limit: None,
            scratch: AudioBlock::with_capacity(0, MAX_CHANNELS, DEFAULT_SAMPLE_RATE),
            silence: Vec::new(),
            fifo: FrameFifo::new(1, MAX_CHANNELS),
            channels: MAX_CHANNELS,
            max_block_frames: 0,
            carry: 0.0,
        }
    }

    /// Premium back-end (default preset)
    pub fn premium(available: bool) -> Self {
        Self::new(SignalsmithPreset::Default, available)
    }

    /// Balanced back-end (cheaper preset)
    pub fn balanced(available: bool) -> Self {
        Self::new(SignalsmithPreset::Cheaper, available)
    }

    pub fn preset(&self) -> SignalsmithPreset {
        self.preset
    }

    /// Tonality limit in effect, `None` when formants move with the pitch
    pub fn tonality_limit(&self) -> Option<f32> {
        self.tonality_limit
    }

    fn apply_transpose(&mut self) {
        let semitones = ratio_to_semitones(self.settings.pitch_ratio);
        self.tonality_limit = self
            .settings
            .formant_preservation
            .then(|| (FORMANT_TONALITY_LIMIT_HZ / self.sample_rate as f64) as f32);
        if let Some(stretcher) = self.stretcher.as_mut() {
            stretcher.set_transpose_factor_semitones(semitones as f32, self.tonality_limit);
        }
    }

    /// Stretch one chunk of at most `max_block_frames` into the FIFO
    fn process_chunk(&mut self, chunk: &[Sample]) {
        let channels = self.channels;
        let Some(stretcher) = self.stretcher.as_mut() else {
            return;
        };

        let frames = chunk.len() / channels;
        let exact = frames as f64 / self.settings.tempo + self.carry;
        let out_frames = (exact.floor() as usize).min(self.scratch.capacity_frames());
        self.carry = exact - out_frames as f64;

        self.scratch.set_frames_within_capacity(out_frames);
        let output = self.scratch.as_interleaved_mut();
        output.fill(0.0);
        stretcher.process(&chunk[..frames * channels], &mut output[..]);

        for frame in self.scratch.iter_frames() {
            self.fifo.write_frame(frame);
        }
    }
}

impl TimeStretchEngine for SignalsmithEngine {
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
        if channels == 0 || channels > MAX_CHANNELS || max_block_frames == 0 {
            return Err(ChainError::EngineInit {
                engine: self.descriptor.name(),
                reason: format!("{} channels, {} frame blocks", channels, max_block_frames),
            });
        }

        let stretcher = self.preset.build(channels, sample_rate);
        let latency = stretcher.input_latency() + stretcher.output_latency();
        let scratch_frames = (max_block_frames * MAX_EXPANSION + 1).max(latency + 1);

        self.scratch = AudioBlock::with_capacity(scratch_frames, channels, sample_rate);
        self.silence = vec![0.0; max_block_frames * channels];
        self.fifo = FrameFifo::new(
            max_block_frames * (MAX_EXPANSION + 4) + latency * (MAX_EXPANSION + 1),
            channels,
        );
        self.stretcher = Some(stretcher);
        self.sample_rate = sample_rate;
        self.channels = channels;
        self.max_block_frames = max_block_frames;
        self.carry = 0.0;
        self.apply_transpose();

        log::debug!(
            "{} engine configured: {}Hz, {} ch, latency {} frames",
            self.descriptor.name(),
            sample_rate,
            channels,
            latency
        );
        Ok(())
    }

    fn set_settings(&mut self, settings: StretchSettings) {
        let settings = settings.clamped();
        let transpose_changed = settings.pitch_ratio != self.settings.pitch_ratio
            || settings.formant_preservation != self.settings.formant_preservation;
        self.settings = settings;
        if transpose_changed {
            self.apply_transpose();
        }
    }

    fn settings(&self) -> StretchSettings {
        self.settings
    }

    fn input_room(&self) -> usize {
        if self.stretcher.is_none() {
            return 0;
        }
        input_room_for(self.fifo.free_frames(), self.settings.tempo)
    }

    fn can_flush(&self) -> bool {
        let Some(stretcher) = self.stretcher.as_ref() else {
            return true;
        };
        // Silence driven through the input latency, then the output tail
        let tail = (stretcher.input_latency() as f64 / self.settings.tempo).ceil() as usize
            + stretcher.output_latency()
            + 2;
        self.fifo.free_frames() >= tail
    }

    fn push(&mut self, input: &[Sample]) {
        if self.stretcher.is_none() {
            return;
        }
        let chunk_len = self.max_block_frames * self.channels;
        for chunk in input.chunks(chunk_len) {
            self.process_chunk(chunk);
        }
    }

    fn pull(&mut self, output: &mut [Sample]) -> usize {
        self.fifo.read_into(output)
    }

    fn available_frames(&self) -> usize {
        self.fifo.available_frames()
    }

    fn flush(&mut self) {
        let Some(input_latency) = self.stretcher.as_ref().map(Stretch::input_latency) else {
            return;
        };

        // Drive the last real input through the analysis window
        let mut remaining = input_latency;
        let silence = std::mem::take(&mut self.silence);
        while remaining > 0 {
            let frames = remaining.min(self.max_block_frames);
            self.process_chunk(&silence[..frames * self.channels]);
            remaining -= frames;
        }
        self.silence = silence;

        let Some(stretcher) = self.stretcher.as_mut() else {
            return;
        };
        let tail = stretcher.output_latency().min(self.scratch.capacity_frames());
        self.scratch.set_frames_within_capacity(tail);
        let output = self.scratch.as_interleaved_mut();
        output.fill(0.0);
        stretcher.flush(&mut output[..]);

        for frame in self.scratch.iter_frames() {
            self.fifo.write_frame(frame);
        }
        stretcher.reset();
        self.carry = 0.0;
    }

    fn clear(&mut self) {
        if let Some(stretcher) = self.stretcher.as_mut() {
            stretcher.reset();
        }
        self.fifo.clear();
        self.carry = 0.0;
    }

    fn latency_frames(&self) -> usize {
        self.stretcher
            .as_ref()
            .map(|s| s.input_latency() + s.output_latency())
            .unwrap_or(0)
    }

    fn dropped_frames(&self) -> u64 {
        self.fifo.dropped_frames()
    }
}
