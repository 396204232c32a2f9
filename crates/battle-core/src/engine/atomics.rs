//! Lock-free state shared between the chain and its observers
//!
//! The audio thread writes, any thread reads. Floats are stored as their bit
//! patterns in `AtomicU32`. All accesses are `Relaxed`: every field is an
//! independent meter value and no reader needs cross-field ordering.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};

use crate::timestretch::{EngineKind, EngineSelection};

/// Metering and diagnostics published by the audio thread
#[derive(Debug)]
pub struct ChainAtomics {
    /// Engine the operator asked for (priority index)
    requested_engine: AtomicU8,
    /// Engine actually producing audio (priority index)
    active_engine: AtomicU8,
    /// Compressor gain reduction in dB (f32 bits)
    compressor_reduction: AtomicU32,
    /// Limiter gain reduction in dB (f32 bits)
    limiter_reduction: AtomicU32,
    /// Latched when the limiter's hard clamp changed a sample
    clipped: AtomicBool,
    /// Engine output frames lost to a full FIFO, summed over all engines
    dropped_frames: AtomicU64,
}

impl ChainAtomics {
    pub fn new(selection: EngineSelection) -> Self {
        Self {
            requested_engine: AtomicU8::new(selection.requested.priority() as u8),
            active_engine: AtomicU8::new(selection.active.priority() as u8),
            compressor_reduction: AtomicU32::new(0f32.to_bits()),
            limiter_reduction: AtomicU32::new(0f32.to_bits()),
            clipped: AtomicBool::new(false),
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Requested and active engine (lock-free)
    #[inline]
    pub fn selection(&self) -> EngineSelection {
        let kind = |cell: &AtomicU8| {
            EngineKind::from_priority(cell.load(Ordering::Relaxed)).unwrap_or(EngineKind::Reference)
        };
        EngineSelection {
            requested: kind(&self.requested_engine),
            active: kind(&self.active_engine),
        }
    }

    #[inline]
    pub fn compressor_gain_reduction_db(&self) -> f32 {
        f32::from_bits(self.compressor_reduction.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn limiter_gain_reduction_db(&self) -> f32 {
        f32::from_bits(self.limiter_reduction.load(Ordering::Relaxed))
    }

    /// Whether the limiter clamped since the last call; clears the flag
    #[inline]
    pub fn take_clipped(&self) -> bool {
        self.clipped.swap(false, Ordering::Relaxed)
    }

    #[inline]
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    pub(crate) fn set_selection(&self, selection: EngineSelection) {
        self.requested_engine
            .store(selection.requested.priority() as u8, Ordering::Relaxed);
        self.active_engine
            .store(selection.active.priority() as u8, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn set_compressor_gain_reduction_db(&self, db: f32) {
        self.compressor_reduction.store(db.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn set_limiter_gain_reduction_db(&self, db: f32) {
        self.limiter_reduction.store(db.to_bits(), Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn flag_clipped(&self) {
        self.clipped.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_dropped_frames(&self, frames: u64) {
        if frames > 0 {
            self.dropped_frames.fetch_add(frames, Ordering::Relaxed);
        }
    }
}
