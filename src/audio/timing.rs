// Audio timing - Sample counter shared by the render and control domains

use crate::scheduling::clock::ClockSource;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Rendering clock
///
/// The render side advances the counter after each cycle; the control side
/// reads it as its `ClockSource`, so both domains agree on what "now" is.
#[derive(Debug, Clone)]
pub struct AudioTiming {
    /// Current sample position (incremented by the render cycle)
    sample_position: Arc<AtomicU64>,
    sample_rate: f64,
}

impl AudioTiming {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_position: Arc::new(AtomicU64::new(0)),
            sample_rate: sample_rate.max(1.0) as f64,
        }
    }

    pub fn current_sample(&self) -> u64 {
        self.sample_position.load(Ordering::Acquire)
    }

    /// Advance sample position (called from the render cycle)
    pub fn advance(&self, frames: usize) {
        self.sample_position
            .fetch_add(frames as u64, Ordering::Release);
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate as f32
    }

    pub fn samples_to_seconds(&self, samples: u64) -> f64 {
        samples as f64 / self.sample_rate
    }

    /// Seconds to the nearest sample (negative clamps to 0)
    pub fn seconds_to_samples(&self, seconds: f64) -> u64 {
        (seconds * self.sample_rate).round().max(0.0) as u64
    }

    /// Offset of `time` inside a cycle starting at sample `cycle_start`
    ///
    /// Late events land on frame 0; the result is capped at `frames - 1`.
    pub fn frame_offset(&self, time: f64, cycle_start: u64, frames: usize) -> u32 {
        let at = self.seconds_to_samples(time);
        let offset = at.saturating_sub(cycle_start);
        offset.min(frames.saturating_sub(1) as u64) as u32
    }

    /// Seconds covered by one buffer of `frames`
    pub fn buffer_duration(&self, frames: usize) -> f64 {
        frames as f64 / self.sample_rate
    }
}

impl ClockSource for AudioTiming {
    fn now(&self) -> f64 {
        self.samples_to_seconds(self.current_sample())
    }
}
