// Lookahead Scheduler - Adaptive scheduling horizon
// Trades latency for robustness: slow tempos, dense passages and a loaded
// render thread all widen the window.

use std::collections::VecDeque;

const DENSITY_HISTORY: usize = 10;
const LOAD_HISTORY: usize = 5;

/// Window bounds, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookaheadLimits {
    pub base_window: f64,
    pub min_window: f64,
    pub max_window: f64,
}

impl Default for LookaheadLimits {
    fn default() -> Self {
        Self {
            base_window: 0.100,
            min_window: 0.050,
            max_window: 0.200,
        }
    }
}

/// Last computed window and the factors behind it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookaheadState {
    pub base_window: f64,
    pub min_window: f64,
    pub max_window: f64,
    pub bpm_factor: f64,
    pub complexity_factor: f64,
    pub load_factor: f64,
    pub current_window: f64,
}

/// BPM factor: 1.5 at or below 80 BPM, 0.8 at or above 180, linear between
pub fn bpm_factor(bpm: f64) -> f64 {
    const SLOW_BPM: f64 = 80.0;
    const FAST_BPM: f64 = 180.0;
    const SLOW_FACTOR: f64 = 1.5;
    const FAST_FACTOR: f64 = 0.8;

    if !bpm.is_finite() || bpm <= SLOW_BPM {
        return SLOW_FACTOR;
    }
    if bpm >= FAST_BPM {
        return FAST_FACTOR;
    }
    let t = (bpm - SLOW_BPM) / (FAST_BPM - SLOW_BPM);
    SLOW_FACTOR + (FAST_FACTOR - SLOW_FACTOR) * t
}

/// Complexity factor from density relative to the busiest passage seen
pub fn complexity_factor(relative_density: f64) -> f64 {
    match relative_density {
        d if d < 0.2 => 0.9,
        d if d < 0.4 => 1.0,
        d if d < 0.6 => 1.1,
        d if d < 0.8 => 1.3,
        _ => 1.5,
    }
}

/// Load factor from render load in percent of the cycle budget
pub fn load_factor(load_percent: f64) -> f64 {
    match load_percent {
        l if l < 20.0 => 0.9,
        l if l < 40.0 => 1.0,
        l if l < 60.0 => 1.1,
        l if l < 80.0 => 1.25,
        _ => 1.4,
    }
}

#[derive(Debug)]
pub struct LookaheadScheduler {
    limits: LookaheadLimits,
    density_history: VecDeque<f64>,
    load_history: VecDeque<f64>,
    session_max_density: f64,
    state: LookaheadState,
}

impl LookaheadScheduler {
    pub fn new(limits: LookaheadLimits) -> Self {
        let base = limits.base_window.clamp(limits.min_window, limits.max_window);
        Self {
            limits,
            density_history: VecDeque::with_capacity(DENSITY_HISTORY),
            load_history: VecDeque::with_capacity(LOAD_HISTORY),
            session_max_density: 0.0,
            state: LookaheadState {
                base_window: limits.base_window,
                min_window: limits.min_window,
                max_window: limits.max_window,
                bpm_factor: 1.0,
                complexity_factor: 1.0,
                load_factor: 1.0,
                current_window: base,
            },
        }
    }

    pub fn limits(&self) -> LookaheadLimits {
        self.limits
    }

    pub fn state(&self) -> LookaheadState {
        self.state
    }

    pub fn current_window(&self) -> f64 {
        self.state.current_window
    }

    /// Recompute the window, in seconds
    ///
    /// `event_density` is events per step around the playhead,
    /// `measured_load` the render load in percent of the cycle budget.
    pub fn compute_window(&mut self, bpm: f64, event_density: f64, measured_load: f64) -> f64 {
        let bpm_factor = bpm_factor(bpm);

        let density = sanitize(event_density);
        push_bounded(&mut self.density_history, density, DENSITY_HISTORY);
        let average_density = mean(&self.density_history);
        self.session_max_density = self.session_max_density.max(average_density);
        let relative = if self.session_max_density > 0.0 {
            average_density / self.session_max_density
        } else {
            0.0
        };
        let complexity_factor = complexity_factor(relative);

        // A spike is never averaged away
        let load = sanitize(measured_load);
        push_bounded(&mut self.load_history, load, LOAD_HISTORY);
        let smoothed_load = load.max(mean(&self.load_history));
        let load_factor = load_factor(smoothed_load);

        let window = (self.limits.base_window * bpm_factor * complexity_factor * load_factor)
            .clamp(self.limits.min_window, self.limits.max_window);

        self.state = LookaheadState {
            base_window: self.limits.base_window,
            min_window: self.limits.min_window,
            max_window: self.limits.max_window,
            bpm_factor,
            complexity_factor,
            load_factor,
            current_window: window,
        };
        window
    }

    /// The playhead jumped; density around the old position no longer applies
    pub fn on_position_change(&mut self) {
        self.density_history.clear();
    }
}

impl Default for LookaheadScheduler {
    fn default() -> Self {
        Self::new(LookaheadLimits::default())
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() { value.max(0.0) } else { 0.0 }
}

fn push_bounded(history: &mut VecDeque<f64>, value: f64, limit: usize) {
    if history.len() == limit {
        history.pop_front();
    }
    history.push_back(value);
}

fn mean(history: &VecDeque<f64>) -> f64 {
    if history.is_empty() {
        return 0.0;
    }
    history.iter().sum::<f64>() / history.len() as f64
}
