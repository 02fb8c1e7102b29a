// Performance Monitor - Render cycle timing and quality feedback
//
// The render side measures a subset of its cycles with `CycleMeter` and
// reports them; the control side feeds them into `PerformanceMonitor`, which
// drives the lookahead load factor and the quality-tier suggestion.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default sliding window (about one second of cycles)
pub const DEFAULT_WINDOW: usize = 60;

/// Health of the render cycle relative to its budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PerformanceStatus {
    Excellent,
    Good,
    Warning,
    Critical,
}

/// Quality tier suggested to performance-adaptive renderers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderLevel {
    Full,
    Simple,
    Minimal,
}

impl From<PerformanceStatus> for RenderLevel {
    fn from(status: PerformanceStatus) -> Self {
        match status {
            PerformanceStatus::Excellent | PerformanceStatus::Good => RenderLevel::Full,
            PerformanceStatus::Warning => RenderLevel::Simple,
            PerformanceStatus::Critical => RenderLevel::Minimal,
        }
    }
}

/// Status thresholds, as multiples of the cycle budget
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub excellent: f64,
    pub good: f64,
    pub warning: f64,
    /// A single cycle this slow flags at least `Warning`
    pub critical: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            excellent: 0.5,
            good: 0.75,
            warning: 1.0,
            critical: 1.5,
        }
    }
}

/// Summary of the current window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceStats {
    pub average: Duration,
    pub peak: Duration,
    pub samples: usize,
    pub load_percent: f64,
    pub status: PerformanceStatus,
}

#[derive(Debug)]
pub struct PerformanceMonitor {
    budget: Duration,
    thresholds: Thresholds,
    window: VecDeque<Duration>,
    window_size: usize,
    min_adjust_interval: f64,
    level: RenderLevel,
    last_adjustment: Option<f64>,
}

impl PerformanceMonitor {
    /// `budget` is the time available per render cycle, `min_adjust_interval`
    /// the minimum number of seconds between two level changes
    pub fn new(budget: Duration, window_size: usize, min_adjust_interval: f64) -> Self {
        let window_size = window_size.max(1);
        Self {
            budget,
            thresholds: Thresholds::default(),
            window: VecDeque::with_capacity(window_size),
            window_size,
            min_adjust_interval: min_adjust_interval.max(0.0),
            level: RenderLevel::Full,
            last_adjustment: None,
        }
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Follow buffer size changes reported by the render side
    pub fn set_budget(&mut self, budget: Duration) {
        self.budget = budget;
    }

    pub fn record_cycle(&mut self, duration: Duration) {
        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(duration);
    }

    pub fn sample_count(&self) -> usize {
        self.window.len()
    }

    pub fn average(&self) -> Duration {
        if self.window.is_empty() {
            return Duration::ZERO;
        }
        self.window.iter().sum::<Duration>() / self.window.len() as u32
    }

    pub fn peak(&self) -> Duration {
        self.window.iter().copied().max().unwrap_or(Duration::ZERO)
    }

    /// Average cycle time as a percentage of the budget
    pub fn load_percent(&self) -> f64 {
        let budget = self.budget.as_secs_f64();
        if budget <= 0.0 {
            return 0.0;
        }
        self.average().as_secs_f64() / budget * 100.0
    }

    pub fn status(&self) -> PerformanceStatus {
        let budget = self.budget.as_secs_f64();
        if budget <= 0.0 || self.window.is_empty() {
            return PerformanceStatus::Excellent;
        }
        let ratio = self.average().as_secs_f64() / budget;
        let by_average = if ratio < self.thresholds.excellent {
            PerformanceStatus::Excellent
        } else if ratio < self.thresholds.good {
            PerformanceStatus::Good
        } else if ratio < self.thresholds.warning {
            PerformanceStatus::Warning
        } else {
            PerformanceStatus::Critical
        };

        let spike = self.peak().as_secs_f64() / budget >= self.thresholds.critical;
        if spike {
            by_average.max(PerformanceStatus::Warning)
        } else {
            by_average
        }
    }

    /// Current quality tier, adjusted at most once per minimum interval
    pub fn suggest_level(&mut self, now: f64) -> RenderLevel {
        let target = RenderLevel::from(self.status());
        if target == self.level {
            return self.level;
        }
        let allowed = match self.last_adjustment {
            None => true,
            Some(last) => now - last >= self.min_adjust_interval,
        };
        if allowed {
            log::info!("Render level {:?} -> {:?}", self.level, target);
            self.level = target;
            self.last_adjustment = Some(now);
        }
        self.level
    }

    pub fn level(&self) -> RenderLevel {
        self.level
    }

    pub fn stats(&self) -> PerformanceStats {
        PerformanceStats {
            average: self.average(),
            peak: self.peak(),
            samples: self.window.len(),
            load_percent: self.load_percent(),
            status: self.status(),
        }
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }
}

/// Render-side cycle timer
///
/// Measures 1 out of N cycles to keep `Instant::now` off most callbacks.
#[derive(Debug)]
pub struct CycleMeter {
    measure_every_n: u32,
    current_count: u32,
}

impl CycleMeter {
    pub fn new(measure_every_n: u32) -> Self {
        Self {
            measure_every_n: measure_every_n.max(1),
            current_count: 0,
        }
    }

    /// Call at cycle start; `Some` if this cycle is measured
    #[inline]
    pub fn start_measure(&mut self) -> Option<Instant> {
        let count = self.current_count;
        self.current_count = self.current_count.wrapping_add(1);
        if count % self.measure_every_n == 0 {
            Some(Instant::now())
        } else {
            None
        }
    }

    /// Call at cycle end with the value from `start_measure`
    #[inline]
    pub fn end_measure(&self, start: Option<Instant>) -> Option<Duration> {
        start.map(|start| start.elapsed())
    }
}
