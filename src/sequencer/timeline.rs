// Timeline - Musical time representation
// Steps, tempo and loop regions, plus conversions between ticks and seconds

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// Tick resolution of one step (a step is a sixteenth note at 4 steps per beat)
pub const TICKS_PER_STEP: u64 = 960;

/// Position on the musical timeline
///
/// Stored as integer ticks so that the integer step index and the fractional
/// sub-step are exact and two timelines built from the same input compare
/// bit-for-bit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct StepPosition {
    ticks: u64,
}

impl StepPosition {
    pub const ZERO: StepPosition = StepPosition { ticks: 0 };

    /// Furthest addressable position
    ///
    /// Leaves headroom on the tick line so extrapolating past it (lookahead,
    /// loop passes, voice durations) cannot overflow.
    pub const MAX: StepPosition = StepPosition {
        ticks: u64::MAX / 4,
    };

    pub const fn from_ticks(ticks: u64) -> Self {
        Self { ticks }
    }

    pub const fn from_steps(steps: u64) -> Self {
        Self {
            ticks: steps * TICKS_PER_STEP,
        }
    }

    /// Create from a fractional step count
    ///
    /// Returns `None` for negative, non-finite or out-of-range input; the
    /// caller decides how to recover (the transport clamps).
    pub fn from_steps_f64(steps: f64) -> Option<Self> {
        if !steps.is_finite() || steps < 0.0 {
            return None;
        }
        let ticks = (steps * TICKS_PER_STEP as f64).round();
        if ticks >= Self::MAX.ticks as f64 {
            return None;
        }
        Some(Self {
            ticks: ticks as u64,
        })
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Integer step index
    pub fn step_index(&self) -> u64 {
        self.ticks / TICKS_PER_STEP
    }

    /// Fractional part within the current step, in [0, 1)
    pub fn sub_step(&self) -> f64 {
        (self.ticks % TICKS_PER_STEP) as f64 / TICKS_PER_STEP as f64
    }

    pub fn as_steps_f64(&self) -> f64 {
        self.ticks as f64 / TICKS_PER_STEP as f64
    }

    pub fn saturating_sub(self, other: StepPosition) -> StepPosition {
        StepPosition::from_ticks(self.ticks.saturating_sub(other.ticks))
    }

    pub fn saturating_add(self, other: StepPosition) -> StepPosition {
        StepPosition::from_ticks(self.ticks.saturating_add(other.ticks))
    }
}

impl Add for StepPosition {
    type Output = StepPosition;

    fn add(self, rhs: StepPosition) -> StepPosition {
        self.saturating_add(rhs)
    }
}

impl Sub for StepPosition {
    type Output = StepPosition;

    fn sub(self, rhs: StepPosition) -> StepPosition {
        self.saturating_sub(rhs)
    }
}

impl fmt::Display for StepPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:03}",
            self.step_index(),
            self.ticks % TICKS_PER_STEP
        )
    }
}

/// Tempo in BPM (Beats Per Minute)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tempo {
    bpm: f64,
}

impl Tempo {
    pub const MIN_BPM: f64 = 20.0;
    pub const MAX_BPM: f64 = 999.0;

    /// Creates a new tempo
    /// BPM must be in range [20.0, 999.0]
    pub fn new(bpm: f64) -> Self {
        assert!(
            (Self::MIN_BPM..=Self::MAX_BPM).contains(&bpm),
            "BPM must be between 20 and 999"
        );
        Self { bpm }
    }

    /// Non-panicking constructor for values coming from the UI or config
    pub fn try_new(bpm: f64) -> Option<Self> {
        (Self::MIN_BPM..=Self::MAX_BPM)
            .contains(&bpm)
            .then_some(Self { bpm })
    }

    /// Get BPM value
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Duration of one beat in seconds
    pub fn beat_duration_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Duration of one step in seconds
    pub fn step_duration_seconds(&self, steps_per_beat: u32) -> f64 {
        self.beat_duration_seconds() / steps_per_beat.max(1) as f64
    }

    /// Tick rate of the timeline in wall-clock time
    pub fn ticks_per_second(&self, steps_per_beat: u32) -> f64 {
        TICKS_PER_STEP as f64 / self.step_duration_seconds(steps_per_beat)
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::new(120.0)
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} BPM", self.bpm)
    }
}

/// Loop region, `end` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopRegion {
    start: StepPosition,
    end: StepPosition,
}

impl LoopRegion {
    /// Returns `None` unless `end > start`
    pub fn new(start: StepPosition, end: StepPosition) -> Option<Self> {
        (end > start).then_some(Self { start, end })
    }

    pub fn start(&self) -> StepPosition {
        self.start
    }

    pub fn end(&self) -> StepPosition {
        self.end
    }

    pub fn length(&self) -> StepPosition {
        self.end - self.start
    }

    pub fn contains(&self, position: StepPosition) -> bool {
        position >= self.start && position < self.end
    }

    /// Fold a position at or past `end` back into the region
    ///
    /// `start + (position - end) mod (end - start)`. Positions before `end`
    /// are returned unchanged, including those before `start`.
    pub fn wrap(&self, position: StepPosition) -> StepPosition {
        if position < self.end {
            return position;
        }
        let overflow = position.ticks - self.end.ticks;
        StepPosition::from_ticks(self.start.ticks + overflow % self.length().ticks)
    }
}
