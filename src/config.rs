// Engine configuration - RON file under the user config directory

use crate::audio::render::RenderSettings;
use crate::messaging::batcher::BatcherLimits;
use crate::scheduling::lookahead::LookaheadLimits;
use crate::sequencer::timeline::Tempo;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const APP_DIR: &str = "mymusic_transport";
const CONFIG_FILE: &str = "engine.ron";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] ron::error::SpannedError),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] ron::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub bpm: f64,
    pub steps_per_beat: u32,
    pub loop_start: f64,
    pub loop_end: f64,
    pub loop_enabled: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            steps_per_beat: 4,
            loop_start: 0.0,
            loop_end: 64.0,
            loop_enabled: false,
        }
    }
}

/// Pool capacities, fixed for the engine's lifetime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub events: usize,
    pub voices: usize,
    pub scratch_buffers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            events: 4096,
            voices: 64,
            scratch_buffers: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookaheadConfig {
    pub base_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    /// Scheduling ticks per second on the control side
    pub tick_rate_hz: f64,
}

impl Default for LookaheadConfig {
    fn default() -> Self {
        Self {
            base_ms: 100.0,
            min_ms: 50.0,
            max_ms: 200.0,
            tick_rate_hz: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatcherConfig {
    pub max_entries: usize,
    pub max_age_ms: f64,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_entries: 32,
            max_age_ms: 16.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Cycles kept in the sliding window
    pub window: usize,
    pub min_adjust_interval_ms: f64,
    /// Render side times 1 out of N cycles
    pub measure_every_n: u32,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            window: 60,
            min_adjust_interval_ms: 2000.0,
            measure_every_n: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// UI updates per second
    pub frame_rate: f64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self { frame_rate: 60.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: f32,
    pub buffer_size: usize,
    pub command_capacity: usize,
    pub report_capacity: usize,
    pub notification_capacity: usize,
    /// Events the render side holds ahead of their cycle
    pub pending_events: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000.0,
            buffer_size: 512,
            command_capacity: 4096,
            report_capacity: 8192,
            notification_capacity: 64,
            pending_events: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub transport: TransportConfig,
    pub pools: PoolConfig,
    pub lookahead: LookaheadConfig,
    pub batcher: BatcherConfig,
    pub performance: PerformanceConfig,
    pub sync: BroadcastConfig,
    pub audio: AudioConfig,
}

impl EngineConfig {
    /// `<config dir>/mymusic_transport/engine.ron`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: EngineConfig = ron::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Load `path`, falling back to defaults when missing or invalid
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::load_from_file(path) {
            Ok(config) => {
                log::info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Ignoring config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.transport;
        if Tempo::try_new(t.bpm).is_none() {
            return Err(invalid(format!(
                "bpm {} outside {}..={}",
                t.bpm,
                Tempo::MIN_BPM,
                Tempo::MAX_BPM
            )));
        }
        if t.steps_per_beat == 0 {
            return Err(invalid("steps_per_beat must be > 0".into()));
        }
        if !(t.loop_start >= 0.0 && t.loop_end > t.loop_start) {
            return Err(invalid(format!(
                "loop end {} must be after loop start {}",
                t.loop_end, t.loop_start
            )));
        }

        let p = &self.pools;
        if p.events == 0 || p.voices == 0 || p.scratch_buffers == 0 {
            return Err(invalid("pool capacities must be > 0".into()));
        }

        let l = &self.lookahead;
        if !(l.min_ms > 0.0 && l.min_ms <= l.base_ms && l.base_ms <= l.max_ms) {
            return Err(invalid(format!(
                "lookahead must satisfy 0 < min ({}) <= base ({}) <= max ({})",
                l.min_ms, l.base_ms, l.max_ms
            )));
        }
        if l.tick_rate_hz <= 0.0 {
            return Err(invalid("tick_rate_hz must be > 0".into()));
        }

        if self.batcher.max_entries == 0 || self.batcher.max_age_ms <= 0.0 {
            return Err(invalid("batcher limits must be > 0".into()));
        }
        if self.performance.window == 0 || self.performance.min_adjust_interval_ms < 0.0 {
            return Err(invalid("performance window must be > 0".into()));
        }
        if self.sync.frame_rate <= 0.0 {
            return Err(invalid("sync frame_rate must be > 0".into()));
        }

        let a = &self.audio;
        if a.sample_rate <= 0.0 || a.buffer_size == 0 {
            return Err(invalid("sample_rate and buffer_size must be > 0".into()));
        }
        if a.command_capacity == 0
            || a.report_capacity == 0
            || a.notification_capacity == 0
            || a.pending_events == 0
        {
            return Err(invalid("channel capacities must be > 0".into()));
        }
        Ok(())
    }

    pub fn lookahead_limits(&self) -> LookaheadLimits {
        LookaheadLimits {
            base_window: self.lookahead.base_ms / 1000.0,
            min_window: self.lookahead.min_ms / 1000.0,
            max_window: self.lookahead.max_ms / 1000.0,
        }
    }

    pub fn batcher_limits(&self) -> BatcherLimits {
        BatcherLimits {
            max_entries: self.batcher.max_entries,
            max_age: self.batcher.max_age_ms / 1000.0,
        }
    }

    pub fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            voices: self.pools.voices,
            pending_capacity: self.audio.pending_events,
            event_capacity: self.pools.events,
            scratch_buffers: self.pools.scratch_buffers,
            buffer_size: self.audio.buffer_size,
            measure_every_n: self.performance.measure_every_n,
        }
    }

    /// Time available to render one buffer, in seconds
    pub fn cycle_budget(&self) -> f64 {
        self.audio.buffer_size as f64 / f64::from(self.audio.sample_rate)
    }
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Invalid(message)
}
