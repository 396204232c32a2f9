//! Processing chain: engine plus the fixed effect topology
//!
//! ```text
//! input → engine → sanitize → bass boost → sub-harmonic → exciter → clarity
//!       → rumble/DC → compressor → dither → limiter → output
//! ```
//!
//! Input first lands in a preallocated backlog. The engine is fed from it
//! only as fast as its output queue can take, so a long input block at a slow
//! tempo waits in the backlog instead of overflowing the engine. Hosts keep
//! calling `process` (with empty input once the stream ends) until it stops
//! producing frames.
//!
//! Battle mode gates every stage after the engine: with it off the engine
//! output passes through untouched. Within battle mode each stage is skipped
//! while its profile or amount says it has nothing to do.

use std::sync::Arc;

use rtrb::Consumer;

use super::atomics::ChainAtomics;
use super::command::{command_channel, ChainCommand};
use super::controller::ChainController;
use super::params::ChainParameters;
use super::profile::AUDIOPHILE_CLARITY_AMOUNT;
use crate::config::ChainConfig;
use crate::dsp::{
    BassBoost, ClarityEnhancer, DcBlocker, Dither, HarmonicExciter, PunchCompressor,
    RumbleFilter, Stage, SubHarmonicSynth, TruePeakLimiter,
};
use crate::error::{ChainError, ChainResult};
use crate::timestretch::{EngineRegistry, EngineSelection, FrameFifo};
use crate::types::{Sample, StreamFormat, MAX_CHANNELS, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE};

/// Effect stages in signal order
struct Stages {
    bass: BassBoost,
    sub: SubHarmonicSynth,
    exciter: HarmonicExciter,
    clarity: ClarityEnhancer,
    rumble: RumbleFilter,
    dc: DcBlocker,
    compressor: PunchCompressor,
    dither: Dither,
    limiter: TruePeakLimiter,
}

impl Stages {
    fn new(dither_bits: u32) -> Self {
        Self {
            bass: BassBoost::new(),
            sub: SubHarmonicSynth::new(),
            exciter: HarmonicExciter::new(),
            clarity: ClarityEnhancer::new(AUDIOPHILE_CLARITY_AMOUNT),
            rumble: RumbleFilter::new(),
            dc: DcBlocker::new(),
            compressor: PunchCompressor::new(),
            dither: Dither::new(dither_bits),
            limiter: TruePeakLimiter::new(),
        }
    }

    fn for_each(&mut self, mut f: impl FnMut(&mut dyn Stage)) {
        f(&mut self.bass);
        f(&mut self.sub);
        f(&mut self.exciter);
        f(&mut self.clarity);
        f(&mut self.rumble);
        f(&mut self.dc);
        f(&mut self.compressor);
        f(&mut self.dither);
        f(&mut self.limiter);
    }
}

/// Input backlog size in multiples of `max_block_frames`
pub const INPUT_BACKLOG_BLOCKS: usize = 16;

/// Which optional stages ran on the previous block
///
/// A stage that switches on starts from clean state instead of whatever it
/// held when it was last switched off.
#[derive(Debug, Clone, Copy, Default)]
struct ActiveStages {
    bass: bool,
    sub: bool,
    exciter: bool,
    audiophile: bool,
    protection: bool,
    compressor: bool,
    limiter: bool,
}

/// Audio-thread side of the chain
///
/// Created together with its [`ChainController`]. Nothing here blocks or
/// allocates after [`configure`](Self::configure).
pub struct ProcessingChain {
    commands: Consumer<ChainCommand>,
    registry: EngineRegistry,
    params: ChainParameters,
    stages: Stages,
    active: ActiveStages,
    atomics: Arc<ChainAtomics>,
    format: Option<StreamFormat>,
    max_block_frames: usize,
    /// Sanitized input not yet handed to the engine
    backlog: FrameFifo,
    /// One engine push worth of input
    input_scratch: Vec<Sample>,
    /// Backlog frames to feed before a requested flush runs
    flush_after: Option<usize>,
    /// Drop count already published to the atomics
    reported_dropped: u64,
}

impl ProcessingChain {
    /// Build an unconfigured chain and its controller
    pub fn new(config: ChainConfig) -> (Self, ChainController) {
        let config = config.sanitized();
        let (producer, consumer) = command_channel(config.command_queue_capacity);

        let mut registry = EngineRegistry::new(&config);
        registry.set_settings(config.parameters.stretch.effective());
        let selection = registry.selection();
        let atomics = Arc::new(ChainAtomics::new(selection));

        let controller = ChainController::new(
            producer,
            config.parameters,
            registry.descriptors().to_vec(),
            selection,
            Arc::clone(&atomics),
        );

        let mut chain = Self {
            commands: consumer,
            registry,
            params: config.parameters,
            stages: Stages::new(config.dither_bits),
            active: ActiveStages::default(),
            atomics,
            format: None,
            max_block_frames: config.max_block_frames,
            backlog: FrameFifo::new(1, MAX_CHANNELS),
            input_scratch: Vec::new(),
            flush_after: None,
            reported_dropped: 0,
        };
        chain.apply_parameters(config.parameters);

        (chain, controller)
    }

    /// Adopt a stream format
    ///
    /// Resets every stage and engine to silence. On error the chain stays
    /// unconfigured and `process` produces nothing.
    pub fn configure(&mut self, sample_rate: u32, channels: usize) -> ChainResult<()> {
        self.format = None;

        if !(MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&sample_rate) {
            return Err(ChainError::UnsupportedSampleRate {
                sample_rate,
                min: MIN_SAMPLE_RATE,
                max: MAX_SAMPLE_RATE,
            });
        }
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(ChainError::UnsupportedChannelCount(channels));
        }

        self.registry
            .configure(sample_rate, channels, self.max_block_frames)?;
        self.registry.set_settings(self.params.stretch.effective());
        self.backlog = FrameFifo::new(self.max_block_frames * INPUT_BACKLOG_BLOCKS, channels);
        self.input_scratch = vec![0.0; self.max_block_frames * channels];
        self.flush_after = None;
        self.stages
            .for_each(|stage| stage.configure(sample_rate, channels));
        self.apply_parameters(self.params);
        self.active = ActiveStages::default();
        self.reported_dropped = 0;

        self.format = Some(StreamFormat {
            sample_rate,
            channels,
        });
        log::info!(
            "Chain configured: {}Hz, {} ch, {} frame blocks, engine {}",
            sample_rate,
            channels,
            self.max_block_frames,
            self.registry.active_kind()
        );
        Ok(())
    }

    /// Run one block
    ///
    /// Queues every whole frame of `input` (non-finite samples replaced by
    /// silence), feeds the engine as far as its output queue allows, and
    /// writes up to `output.len() / channels` processed frames. Returns the
    /// number of frames written, which need not match the input: output the
    /// engine has not produced yet comes out of later calls. Input beyond
    /// the backlog capacity (`INPUT_BACKLOG_BLOCKS * max_block_frames` frames
    /// waiting) is dropped and counted. An unconfigured chain returns 0.
    pub fn process(&mut self, input: &[Sample], output: &mut [Sample]) -> usize {
        self.drain_commands();

        let Some(format) = self.format else {
            return 0;
        };
        let channels = format.channels;

        let whole_input = input.len() - input.len() % channels;
        let mut frame = [0.0; MAX_CHANNELS];
        for src in input[..whole_input].chunks_exact(channels) {
            for (dst, &sample) in frame.iter_mut().zip(src) {
                *dst = if sample.is_finite() { sample } else { 0.0 };
            }
            self.backlog.write_frame(&frame[..channels]);
        }

        self.render(output, channels)
    }

    /// Push the engine's buffered tail out (end of stream)
    ///
    /// Everything queued so far is fed to the engine first. Writes up to
    /// `output.len() / channels` frames; call `process` with an empty input
    /// to collect anything that did not fit. If the engine's output queue is
    /// too full to take the tail yet, the flush completes during those calls.
    pub fn flush(&mut self, output: &mut [Sample]) -> usize {
        self.drain_commands();

        let Some(format) = self.format else {
            return 0;
        };
        self.flush_after = Some(self.backlog.available_frames());
        self.render(output, format.channels)
    }

    /// Input frames queued but not yet handed to the engine
    pub fn pending_input_frames(&self) -> usize {
        self.backlog.available_frames()
    }

    /// Feed, pull, and feed again so the next call finds output ready
    fn render(&mut self, output: &mut [Sample], channels: usize) -> usize {
        self.feed_engine(channels);

        let whole_output = output.len() - output.len() % channels;
        let frames = match self.registry.active_mut() {
            Some(engine) => engine.pull(&mut output[..whole_output]),
            None => 0,
        };

        self.feed_engine(channels);
        self.run_effects(&mut output[..frames * channels]);
        self.publish_dropped();
        frames
    }

    /// Move backlog frames into the engine while its output queue has room
    fn feed_engine(&mut self, channels: usize) {
        let Some(engine) = self.registry.active_mut() else {
            return;
        };
        loop {
            let mut frames = self
                .backlog
                .available_frames()
                .min(self.max_block_frames)
                .min(engine.input_room());
            if let Some(remaining) = self.flush_after {
                frames = frames.min(remaining);
            }

            if frames > 0 {
                let scratch = &mut self.input_scratch[..frames * channels];
                self.backlog.read_into(scratch);
                engine.push(scratch);
                if let Some(remaining) = self.flush_after.as_mut() {
                    *remaining -= frames;
                }
                continue;
            }

            // Backlog up to the flush point is in; run the flush once it fits
            if self.flush_after == Some(0) && engine.can_flush() {
                engine.flush();
                self.flush_after = None;
                continue;
            }
            break;
        }
    }

    /// Drop all buffered audio and reset every stage
    pub fn clear(&mut self) {
        self.registry.clear_all();
        self.backlog.clear();
        self.flush_after = None;
        self.stages.for_each(|stage| stage.reset());
        self.active = ActiveStages::default();
        self.atomics.set_compressor_gain_reduction_db(0.0);
        self.atomics.set_limiter_gain_reduction_db(0.0);
    }

    pub fn engine_selection(&self) -> EngineSelection {
        self.registry.selection()
    }

    /// Frames the active engine has ready
    pub fn available_frames(&self) -> usize {
        self.registry
            .active()
            .map_or(0, |engine| engine.available_frames())
    }

    /// Processing delay of the active engine in frames
    pub fn latency_frames(&self) -> usize {
        self.registry
            .active()
            .map_or(0, |engine| engine.latency_frames())
    }

    pub fn atomics(&self) -> &Arc<ChainAtomics> {
        &self.atomics
    }

    pub fn format(&self) -> Option<StreamFormat> {
        self.format
    }

    pub fn parameters(&self) -> &ChainParameters {
        &self.params
    }

    /// Apply queued commands; only the newest parameter snapshot counts
    fn drain_commands(&mut self) {
        let mut latest = None;
        while let Ok(command) = self.commands.pop() {
            match command {
                ChainCommand::UpdateParameters(params) => latest = Some(params),
                ChainCommand::SelectEngine(selection) => {
                    self.registry.select(selection);
                    self.backlog.clear();
                    self.flush_after = None;
                    self.atomics.set_selection(selection);
                }
                ChainCommand::Clear => self.clear(),
            }
        }
        if let Some(params) = latest {
            self.apply_parameters(params);
        }
    }

    fn apply_parameters(&mut self, params: ChainParameters) {
        if params.stretch.effective() != self.params.stretch.effective() {
            self.registry.set_settings(params.stretch.effective());
        }
        self.params = params;

        let effects = &params.effects;
        let stages = &mut self.stages;
        stages.bass.set_gain_db(effects.bass_boost_db());
        stages.bass.set_frequency_hz(effects.bass_frequency_hz());
        stages.sub.set_amount(effects.sub_harmonic());
        stages.exciter.set_amount(effects.exciter());

        stages.compressor.set_threshold_db(effects.compressor_threshold_db());
        stages.compressor.set_ratio(effects.compressor_ratio());
        stages.compressor.set_attack_ms(effects.compressor_attack_ms());
        stages.compressor.set_release_ms(effects.compressor_release_ms());
        stages.compressor.set_makeup_db(effects.compressor_makeup_db());
        stages.compressor.set_knee_db(effects.compressor_knee_db());

        stages.limiter.set_threshold_db(effects.limiter_threshold_db());
        stages.limiter.set_release_ms(effects.limiter_release_ms());
        stages.limiter.set_ceiling_db(
            params
                .profile
                .effective_ceiling_db(effects.limiter_ceiling_db()),
        );
    }

    fn run_effects(&mut self, samples: &mut [Sample]) {
        if samples.is_empty() {
            return;
        }
        for sample in samples.iter_mut() {
            if !sample.is_finite() {
                *sample = 0.0;
            }
        }

        let profile = self.params.profile;
        let stages = &mut self.stages;
        let was = self.active;

        if !profile.effects_active() {
            if was.compressor {
                self.atomics.set_compressor_gain_reduction_db(0.0);
            }
            if was.limiter {
                self.atomics.set_limiter_gain_reduction_db(0.0);
            }
            self.active = ActiveStages::default();
            return;
        }

        let bass = stages.bass.is_active();
        if bass {
            if !was.bass {
                stages.bass.reset();
            }
            stages.bass.process(samples);
        }

        let sub = profile.coloration_allowed() && stages.sub.is_active();
        if sub {
            if !was.sub {
                stages.sub.reset();
            }
            stages.sub.process(samples);
        }

        let exciter = profile.coloration_allowed() && stages.exciter.is_active();
        if exciter {
            if !was.exciter {
                stages.exciter.reset();
            }
            stages.exciter.process(samples);
        }

        let audiophile = profile.audiophile_active();
        if audiophile {
            if !was.audiophile {
                stages.clarity.reset();
                stages.dither.reset();
            }
            stages.clarity.process(samples);
        }

        let protection = profile.protection_active();
        if protection {
            if !was.protection {
                stages.rumble.reset();
                stages.dc.reset();
            }
            stages.rumble.process(samples);
            stages.dc.process(samples);
        }

        let compressor = profile.compressor_enabled();
        if compressor {
            if !was.compressor {
                stages.compressor.reset();
            }
            stages.compressor.process(samples);
            self.atomics
                .set_compressor_gain_reduction_db(stages.compressor.gain_reduction_db());
        } else if was.compressor {
            self.atomics.set_compressor_gain_reduction_db(0.0);
        }

        if audiophile {
            stages.dither.process(samples);
        }

        // Last stage: nothing after it may change a sample
        let limiter = profile.limiter_active();
        if limiter {
            if !was.limiter {
                stages.limiter.reset();
            }
            stages.limiter.process(samples);
            self.atomics
                .set_limiter_gain_reduction_db(stages.limiter.gain_reduction_db());
            if stages.limiter.take_clipped() {
                self.atomics.flag_clipped();
            }
        } else if was.limiter {
            self.atomics.set_limiter_gain_reduction_db(0.0);
        }

        self.active = ActiveStages {
            bass,
            sub,
            exciter,
            audiophile,
            protection,
            compressor,
            limiter,
        };
    }

    fn publish_dropped(&mut self) {
        let total = self.registry.dropped_frames() + self.backlog.dropped_frames();
        if total > self.reported_dropped {
            self.atomics.add_dropped_frames(total - self.reported_dropped);
        }
        self.reported_dropped = total;
    }
}
