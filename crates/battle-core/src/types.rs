//! Common types for the battle chain
//!
//! Interleaved PCM blocks, stream format limits and the level conversions
//! shared by every stage.

/// Audio sample type (32-bit float throughout the chain)
pub type Sample = f32;

/// Default sample rate when no device has been configured yet
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Lowest sample rate accepted by `configure`
pub const MIN_SAMPLE_RATE: u32 = 8000;

/// Highest sample rate accepted by `configure`
pub const MAX_SAMPLE_RATE: u32 = 192_000;

/// Maximum number of interleaved channels (mono or stereo)
pub const MAX_CHANNELS: usize = 2;

/// Default maximum frames handed to a single process call
///
/// Every scratch buffer and output FIFO is sized from this at configure time,
/// so the audio thread never allocates.
pub const DEFAULT_MAX_BLOCK_FRAMES: usize = 8192;

/// Convert decibels to a linear gain factor
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert a linear gain factor to decibels (floored at -100 dB)
#[inline]
pub fn linear_to_db(linear: f32) -> f32 {
    if linear <= 1e-5 {
        -100.0
    } else {
        20.0 * linear.log10()
    }
}

/// Peak absolute value of one interleaved frame
#[inline]
pub fn frame_peak(frame: &[Sample]) -> Sample {
    frame.iter().fold(0.0, |peak, s| peak.max(s.abs()))
}

/// Validated stream format set by `ProcessingChain::configure`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: usize,
}

impl Default for StreamFormat {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: MAX_CHANNELS,
        }
    }
}

/// A block of interleaved audio tagged with its format
///
/// Layout is `[ch0, ch1, ch0, ch1, ...]` for stereo and plain samples for mono.
/// The length is always a whole number of frames.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    samples: Vec<Sample>,
    channels: usize,
    sample_rate: u32,
}

impl AudioBlock {
    /// Create an empty block that can hold `frames` frames without reallocating
    pub fn with_capacity(frames: usize, channels: usize, sample_rate: u32) -> Self {
        Self {
            samples: Vec::with_capacity(frames * channels),
            channels: channels.max(1),
            sample_rate,
        }
    }

    /// Create a block filled with silence
    pub fn silence(frames: usize, channels: usize, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        Self {
            samples: vec![0.0; frames * channels],
            channels,
            sample_rate,
        }
    }

    /// Wrap interleaved samples
    pub fn from_interleaved(samples: Vec<Sample>, channels: usize, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        assert!(
            samples.len() % channels == 0,
            "Interleaved buffer length must be a multiple of the channel count"
        );
        Self {
            samples,
            channels,
            sample_rate,
        }
    }

    /// Build a block by evaluating `f(frame, channel)` for every sample
    pub fn from_fn<F>(frames: usize, channels: usize, sample_rate: u32, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> Sample,
    {
        let channels = channels.max(1);
        let mut samples = Vec::with_capacity(frames * channels);
        for frame in 0..frames {
            for ch in 0..channels {
                samples.push(f(frame, ch));
            }
        }
        Self {
            samples,
            channels,
            sample_rate,
        }
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames in the block
    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Capacity in frames
    #[inline]
    pub fn capacity_frames(&self) -> usize {
        self.samples.capacity() / self.channels
    }

    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        &self.samples
    }

    #[inline]
    pub fn as_interleaved_mut(&mut self) -> &mut [Sample] {
        &mut self.samples
    }

    /// Borrow a single frame
    #[inline]
    pub fn frame(&self, index: usize) -> &[Sample] {
        let start = index * self.channels;
        &self.samples[start..start + self.channels]
    }

    /// Iterate over frames
    pub fn iter_frames(&self) -> std::slice::ChunksExact<'_, Sample> {
        self.samples.chunks_exact(self.channels)
    }

    /// Iterate over the samples of one channel
    pub fn channel(&self, channel: usize) -> impl Iterator<Item = Sample> + '_ {
        self.samples
            .iter()
            .skip(channel)
            .step_by(self.channels)
            .copied()
    }

    /// Resize the block to `frames` within its existing capacity
    ///
    /// Real-time safe: never allocates. Frames beyond the capacity are not added.
    /// New frames are silent.
    pub fn set_frames_within_capacity(&mut self, frames: usize) {
        let len = (frames * self.channels).min(self.samples.capacity());
        let len = len - len % self.channels;
        if len <= self.samples.len() {
            self.samples.truncate(len);
        } else {
            // resize within capacity does not reallocate
            self.samples.resize(len, 0.0);
        }
    }

    /// Append frames from an interleaved slice
    pub fn extend_from_interleaved(&mut self, samples: &[Sample]) {
        let whole = samples.len() - samples.len() % self.channels;
        self.samples.extend_from_slice(&samples[..whole]);
    }

    /// Fill with silence, keeping the length
    pub fn fill_silence(&mut self) {
        self.samples.fill(0.0);
    }

    /// Remove all frames, keeping the allocation
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Peak absolute sample value
    pub fn peak(&self) -> Sample {
        frame_peak(&self.samples)
    }

    /// RMS level over all samples
    pub fn rms(&self) -> Sample {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum / self.samples.len() as f64).sqrt() as Sample
    }

    /// Consume the block and return the interleaved samples
    pub fn into_interleaved(self) -> Vec<Sample> {
        self.samples
    }
}
