// Engine module - Builds the control and render halves of the transport

pub mod controller;

use crate::audio::performance::PerformanceMonitor;
use crate::audio::render::RenderTransport;
use crate::audio::timing::AudioTiming;
use crate::config::{ConfigError, EngineConfig};
use crate::messaging::batcher::ParameterBatcher;
use crate::messaging::channels::{
    create_command_channel, create_notification_channel, create_report_channel,
    NotificationConsumer,
};
use crate::scheduling::clock::ClockSource;
use crate::scheduling::lookahead::LookaheadScheduler;
use crate::scheduling::queue::EventQueue;
use crate::sequencer::timeline::Tempo;
use crate::sequencer::transport::{PositionClock, TransportError};
use crate::sync::broadcaster::SyncBroadcaster;
use controller::ControllerParts;
use std::sync::Arc;
use std::time::Duration;

pub use controller::{ControllerStats, TickReport, TransportController};

/// Both halves of a built engine plus the UI notification stream
pub struct TransportEngine {
    pub controller: TransportController,
    pub render: RenderTransport,
    pub notifications: NotificationConsumer,
}

impl TransportEngine {
    /// Build an engine whose control side reads time from the render clock
    pub fn build(config: &EngineConfig) -> Result<Self, ConfigError> {
        let timing = AudioTiming::new(config.audio.sample_rate);
        let clock_source: Arc<dyn ClockSource> = Arc::new(timing.clone());
        Self::build_with(config, timing, clock_source)
    }

    /// Build with an explicit control-side clock
    pub fn build_with(
        config: &EngineConfig,
        timing: AudioTiming,
        clock_source: Arc<dyn ClockSource>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let (command_tx, command_rx) = create_command_channel(config.audio.command_capacity);
        let (report_tx, report_rx) = create_report_channel(config.audio.report_capacity);
        let (notification_tx, notification_rx) =
            create_notification_channel(config.audio.notification_capacity);

        let transport = &config.transport;
        let mut clock = PositionClock::new(Tempo::new(transport.bpm), transport.steps_per_beat);
        clock
            .set_loop(transport.loop_start, transport.loop_end, transport.loop_enabled, 0.0)
            .map_err(|e: TransportError| ConfigError::Invalid(e.to_string()))?;

        let performance = PerformanceMonitor::new(
            Duration::from_secs_f64(config.cycle_budget()),
            config.performance.window,
            config.performance.min_adjust_interval_ms / 1000.0,
        );

        let controller = TransportController::new(ControllerParts {
            clock_source,
            clock,
            lookahead: LookaheadScheduler::new(config.lookahead_limits()),
            queue: EventQueue::new(config.pools.events),
            batcher: ParameterBatcher::new(config.batcher_limits()),
            broadcaster: SyncBroadcaster::new(config.sync.frame_rate),
            performance,
            commands: command_tx,
            reports: report_rx,
            notifications: notification_tx,
        });
        let render = RenderTransport::new(timing, command_rx, report_tx, config.render_settings());

        log::info!(
            "Transport engine ready: {} BPM, {} Hz / {} frames, {} event slots, {} voices",
            transport.bpm,
            config.audio.sample_rate,
            config.audio.buffer_size,
            config.pools.events,
            config.pools.voices
        );

        Ok(Self {
            controller,
            render,
            notifications: notification_rx,
        })
    }
}
