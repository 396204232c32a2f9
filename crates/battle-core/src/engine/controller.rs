//! Control-thread handle of a processing chain
//!
//! The controller keeps its own copy of the parameters. Every setter edits
//! that copy and, when the value actually changed, queues the whole snapshot
//! for the audio thread. If the queue is full the update stays pending and
//! goes out with the next setter call or an explicit [`ChainController::retry_pending`].

use std::sync::Arc;

use rtrb::Producer;

use super::atomics::ChainAtomics;
use super::command::ChainCommand;
use super::params::ChainParameters;
use crate::timestretch::{resolve_selection, EngineDescriptor, EngineKind, EngineSelection};

/// Handle for adjusting a [`ProcessingChain`](super::ProcessingChain) from another thread
pub struct ChainController {
    commands: Producer<ChainCommand>,
    params: ChainParameters,
    descriptors: Vec<EngineDescriptor>,
    selection: EngineSelection,
    atomics: Arc<ChainAtomics>,
    pending_selection: Option<EngineSelection>,
    pending_clear: bool,
    pending_params: bool,
}

impl ChainController {
    pub(crate) fn new(
        commands: Producer<ChainCommand>,
        params: ChainParameters,
        descriptors: Vec<EngineDescriptor>,
        selection: EngineSelection,
        atomics: Arc<ChainAtomics>,
    ) -> Self {
        Self {
            commands,
            params,
            descriptors,
            selection,
            atomics,
            pending_selection: None,
            pending_clear: false,
            pending_params: false,
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Tempo / pitch
    // ─────────────────────────────────────────────────────────────

    /// Tempo ratio (0.05-10); leaves rate mode
    pub fn set_speed(&mut self, speed: f64) {
        self.update(|p| p.stretch.set_speed(speed));
    }

    /// Pitch shift in semitones (±36); leaves rate mode
    pub fn set_pitch_semitones(&mut self, semitones: f64) {
        self.update(|p| p.stretch.set_pitch_semitones(semitones));
    }

    /// Pitch shift as a frequency ratio; leaves rate mode
    pub fn set_pitch_ratio(&mut self, ratio: f64) {
        self.update(|p| p.stretch.set_pitch_ratio(ratio));
    }

    /// Varispeed (0.05-10): tempo and pitch follow `rate` together
    pub fn set_rate(&mut self, rate: f64) {
        self.update(|p| p.stretch.set_rate(rate));
    }

    /// Keep formants in place while pitch shifting (default on)
    ///
    /// Only engines whose descriptor reports `formant_preservation` honor it.
    pub fn set_formant_preservation(&mut self, enabled: bool) {
        self.update(|p| p.stretch.set_formant_preservation(enabled));
    }

    // ─────────────────────────────────────────────────────────────
    // Effects
    // ─────────────────────────────────────────────────────────────

    pub fn set_bass_boost(&mut self, gain_db: f32) {
        self.update(|p| p.effects.set_bass_boost_db(gain_db));
    }

    pub fn set_bass_frequency(&mut self, frequency_hz: f32) {
        self.update(|p| p.effects.set_bass_frequency_hz(frequency_hz));
    }

    pub fn set_sub_harmonic(&mut self, amount: f32) {
        self.update(|p| p.effects.set_sub_harmonic(amount));
    }

    pub fn set_exciter(&mut self, amount: f32) {
        self.update(|p| p.effects.set_exciter(amount));
    }

    pub fn set_compressor_threshold(&mut self, db: f32) {
        self.update(|p| p.effects.set_compressor_threshold_db(db));
    }

    pub fn set_compressor_ratio(&mut self, ratio: f32) {
        self.update(|p| p.effects.set_compressor_ratio(ratio));
    }

    pub fn set_compressor_attack(&mut self, ms: f32) {
        self.update(|p| p.effects.set_compressor_attack_ms(ms));
    }

    pub fn set_compressor_release(&mut self, ms: f32) {
        self.update(|p| p.effects.set_compressor_release_ms(ms));
    }

    pub fn set_compressor_makeup(&mut self, db: f32) {
        self.update(|p| p.effects.set_compressor_makeup_db(db));
    }

    /// Soft-knee width in dB; 0 is a hard knee
    pub fn set_compressor_knee(&mut self, db: f32) {
        self.update(|p| p.effects.set_compressor_knee_db(db));
    }

    pub fn set_limiter_threshold(&mut self, db: f32) {
        self.update(|p| p.effects.set_limiter_threshold_db(db));
    }

    /// Stored ceiling; hardware protection may enforce a lower one
    pub fn set_limiter_ceiling(&mut self, db: f32) {
        self.update(|p| p.effects.set_limiter_ceiling_db(db));
    }

    pub fn set_limiter_release(&mut self, ms: f32) {
        self.update(|p| p.effects.set_limiter_release_ms(ms));
    }

    // ─────────────────────────────────────────────────────────────
    // Profiles
    // ─────────────────────────────────────────────────────────────

    pub fn set_battle_mode(&mut self, enabled: bool) {
        self.update(|p| std::mem::replace(&mut p.profile.battle_mode, enabled) != enabled);
    }

    pub fn set_limiter_enabled(&mut self, enabled: bool) {
        self.update(|p| std::mem::replace(&mut p.profile.limiter_enabled, enabled) != enabled);
    }

    pub fn set_hardware_protection(&mut self, enabled: bool) {
        self.update(|p| {
            std::mem::replace(&mut p.profile.hardware_protection, enabled) != enabled
        });
    }

    /// Enabling zeroes the sub-harmonic and exciter amounts
    pub fn set_audiophile_mode(&mut self, enabled: bool) {
        self.update(|p| p.set_audiophile_mode(enabled));
    }

    // ─────────────────────────────────────────────────────────────
    // Engines
    // ─────────────────────────────────────────────────────────────

    /// Request an engine; returns what will actually run
    ///
    /// Every selection clears all engines' buffers, even when the active
    /// engine does not change.
    pub fn select_engine(&mut self, kind: EngineKind) -> EngineSelection {
        let selection = resolve_selection(&self.descriptors, kind);
        if selection.is_fallback() {
            log::warn!(
                "Engine {} unavailable, falling back to {}",
                selection.requested,
                selection.active
            );
        } else {
            log::info!("Selecting engine {}", selection.active);
        }
        self.selection = selection;
        self.pending_selection = Some(selection);
        self.retry_pending();
        selection
    }

    /// Selection as last requested through this controller
    pub fn engine_selection(&self) -> EngineSelection {
        self.selection
    }

    /// Every known engine in priority order
    pub fn engines(&self) -> &[EngineDescriptor] {
        &self.descriptors
    }

    /// Drop buffered audio on the audio thread
    pub fn clear(&mut self) {
        self.pending_clear = true;
        self.retry_pending();
    }

    pub fn parameters(&self) -> &ChainParameters {
        &self.params
    }

    pub fn atomics(&self) -> &Arc<ChainAtomics> {
        &self.atomics
    }

    /// Whether any command is still waiting for queue space
    pub fn has_pending(&self) -> bool {
        self.pending_selection.is_some() || self.pending_clear || self.pending_params
    }

    /// Push whatever is still pending; returns true when nothing is left
    pub fn retry_pending(&mut self) -> bool {
        if let Some(selection) = self.pending_selection {
            if !self.send(ChainCommand::SelectEngine(selection)) {
                return false;
            }
            self.pending_selection = None;
        }
        if self.pending_clear {
            if !self.send(ChainCommand::Clear) {
                return false;
            }
            self.pending_clear = false;
        }
        if self.pending_params {
            if !self.send(ChainCommand::UpdateParameters(self.params)) {
                return false;
            }
            self.pending_params = false;
        }
        true
    }

    fn update<F>(&mut self, edit: F)
    where
        F: FnOnce(&mut ChainParameters) -> bool,
    {
        if edit(&mut self.params) {
            self.pending_params = true;
        }
        self.retry_pending();
    }

    fn send(&mut self, command: ChainCommand) -> bool {
        match self.commands.push(command) {
            Ok(()) => true,
            Err(_) => {
                log::warn!("Command queue full, {:?} will be retried", command);
                false
            }
        }
    }
}
