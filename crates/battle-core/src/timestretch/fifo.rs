//! Preallocated frame queue used by the back-ends and the chain's input backlog
//!
//! A single-threaded use of an `rtrb` ring buffer: both ends live in the same
//! engine, which gives a fixed-capacity FIFO with no allocation after
//! construction.

use rtrb::{Consumer, Producer, RingBuffer};

use crate::types::Sample;

/// Interleaved frame FIFO with a fixed capacity
pub struct FrameFifo {
    producer: Producer<Sample>,
    consumer: Consumer<Sample>,
    channels: usize,
    dropped_frames: u64,
}

impl FrameFifo {
    pub fn new(capacity_frames: usize, channels: usize) -> Self {
        let channels = channels.max(1);
        let (producer, consumer) = RingBuffer::new(capacity_frames.max(1) * channels);
        Self {
            producer,
            consumer,
            channels,
            dropped_frames: 0,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Append one frame; when full the frame is dropped and counted
    #[inline]
    pub fn write_frame(&mut self, frame: &[Sample]) {
        if self.producer.slots() < self.channels {
            self.dropped_frames += 1;
            return;
        }
        for &sample in &frame[..self.channels] {
            // Space was checked above
            let _ = self.producer.push(sample);
        }
    }

    /// Move up to `output.len() / channels` frames out; returns frames moved
    pub fn read_into(&mut self, output: &mut [Sample]) -> usize {
        let frames = (output.len() / self.channels).min(self.available_frames());
        for slot in output[..frames * self.channels].iter_mut() {
            *slot = self.consumer.pop().unwrap_or(0.0);
        }
        frames
    }

    #[inline]
    pub fn available_frames(&self) -> usize {
        self.consumer.slots() / self.channels
    }

    /// Frames that can be written before the queue drops
    #[inline]
    pub fn free_frames(&self) -> usize {
        self.producer.slots() / self.channels
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    /// Discard all queued frames
    pub fn clear(&mut self) {
        while self.consumer.pop().is_ok() {}
    }
}
