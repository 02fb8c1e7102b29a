// Sync Broadcaster - Throttled position updates for UI consumers

use crate::sequencer::transport::TransportSnapshot;

/// Default UI cadence
pub const DEFAULT_FRAME_RATE: f64 = 60.0;

/// How a consumer wants positions expressed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncConfig {
    /// Consumer units per step (e.g. pixels)
    pub units_per_step: f64,
    /// Added after scaling
    pub offset: f64,
    /// `false` to receive the unwrapped, ever-increasing position
    pub loop_aware: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            units_per_step: 1.0,
            offset: 0.0,
            loop_aware: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncUpdate {
    pub position_units: f64,
    pub step_position: f64,
    pub is_playing: bool,
    pub timestamp: f64,
}

pub type SyncCallback = Box<dyn FnMut(&SyncUpdate) + Send>;

struct Subscriber {
    id: String,
    config: SyncConfig,
    callback: SyncCallback,
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("id", &self.id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Fans out position updates at most once per frame interval
#[derive(Debug)]
pub struct SyncBroadcaster {
    subscribers: Vec<Subscriber>,
    frame_interval: f64,
    last_publish: Option<f64>,
    force_next: bool,
}

impl SyncBroadcaster {
    pub fn new(frame_rate: f64) -> Self {
        Self {
            subscribers: Vec::new(),
            frame_interval: 1.0 / frame_rate.max(f64::MIN_POSITIVE),
            last_publish: None,
            force_next: true,
        }
    }

    pub fn frame_interval(&self) -> f64 {
        self.frame_interval
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Register a consumer; an existing id is replaced
    pub fn subscribe(&mut self, id: impl Into<String>, config: SyncConfig, callback: SyncCallback) {
        let id = id.into();
        self.subscribers.retain(|s| s.id != id);
        log::debug!("Sync subscriber '{}' registered", id);
        self.subscribers.push(Subscriber {
            id,
            config,
            callback,
        });
        // New consumers get a position on the next publish
        self.force_next = true;
    }

    pub fn unsubscribe(&mut self, id: &str) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        before != self.subscribers.len()
    }

    /// Make the next `publish` go out regardless of the throttle
    pub fn force(&mut self) {
        self.force_next = true;
    }

    /// Send an update to every subscriber if a frame is due
    ///
    /// Returns whether anything was published.
    pub fn publish(&mut self, now: f64, snapshot: &TransportSnapshot) -> bool {
        let due = match self.last_publish {
            None => true,
            Some(last) => now - last >= self.frame_interval,
        };
        if !(due || self.force_next) {
            return false;
        }
        self.last_publish = Some(now);
        self.force_next = false;

        let wrapped = snapshot.position_at(now).as_steps_f64();
        let unwrapped = snapshot.unwrapped_position_at(now).as_steps_f64();
        for subscriber in &mut self.subscribers {
            let update = make_update(
                &subscriber.config,
                wrapped,
                unwrapped,
                snapshot.is_playing(),
                now,
            );
            (subscriber.callback)(&update);
        }
        true
    }
}

impl Default for SyncBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_RATE)
    }
}

fn make_update(
    config: &SyncConfig,
    wrapped: f64,
    unwrapped: f64,
    is_playing: bool,
    timestamp: f64,
) -> SyncUpdate {
    let step_position = if config.loop_aware { wrapped } else { unwrapped };
    SyncUpdate {
        position_units: step_position * config.units_per_step + config.offset,
        step_position,
        is_playing,
        timestamp,
    }
}
