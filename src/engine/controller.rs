// Transport Controller - Control-domain owner of the transport
//
// Owns the position clock and everything that schedules against it. All
// time comes from the injected `ClockSource`; `tick` is the scheduling step.

use crate::audio::performance::{
    PerformanceMonitor, PerformanceStats, PerformanceStatus, RenderLevel,
};
use crate::messaging::batcher::{ParameterBatcher, SetOptions};
use crate::messaging::channels::{CommandProducer, NotificationProducer, ReportConsumer};
use crate::messaging::command::{Command, RenderReport};
use crate::messaging::notification::{Escalation, Notification};
use crate::scheduling::clock::ClockSource;
use crate::scheduling::lookahead::{LookaheadScheduler, LookaheadState};
use crate::scheduling::queue::{EventQueue, ReadyEvent};
use crate::scheduling::ScheduleError;
use crate::sequencer::note::TargetId;
use crate::sequencer::pattern::Pattern;
use crate::sequencer::timeline::StepPosition;
use crate::sequencer::transport::{
    PositionClock, TransportError, TransportSnapshot, TransportState,
};
use crate::sync::broadcaster::{SyncBroadcaster, SyncCallback, SyncConfig};
use ringbuf::traits::{Consumer, Producer};
use std::sync::Arc;

/// Steps ahead of the playhead sampled for event density
const DENSITY_SPAN_STEPS: u64 = 16;

/// Result of one scheduling tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickReport {
    pub now: f64,
    pub window: f64,
    pub materialized: usize,
    pub dispatched: usize,
    pub position: StepPosition,
    pub generation: u64,
}

/// Running totals since the engine was built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControllerStats {
    pub materialized: u64,
    pub dispatched: u64,
    pub acknowledged: u64,
    /// Events lost to pool exhaustion or a full command channel
    pub dropped: u64,
    pub voices_starved: u64,
}

pub(crate) struct ControllerParts {
    pub clock_source: Arc<dyn ClockSource>,
    pub clock: PositionClock,
    pub lookahead: LookaheadScheduler,
    pub queue: EventQueue,
    pub batcher: ParameterBatcher,
    pub broadcaster: SyncBroadcaster,
    pub performance: PerformanceMonitor,
    pub commands: CommandProducer,
    pub reports: ReportConsumer,
    pub notifications: NotificationProducer,
}

pub struct TransportController {
    clock_source: Arc<dyn ClockSource>,
    clock: PositionClock,
    pattern: Pattern,
    lookahead: LookaheadScheduler,
    queue: EventQueue,
    batcher: ParameterBatcher,
    broadcaster: SyncBroadcaster,
    performance: PerformanceMonitor,
    commands: CommandProducer,
    reports: ReportConsumer,
    notifications: NotificationProducer,
    ready: Vec<ReadyEvent>,
    /// Latest snapshot could not be delivered; retry on the next tick
    snapshot_pending: bool,
    /// Exhaustion already escalated; cleared by the next clean span
    exhaustion_reported: bool,
    /// Overload already escalated; cleared once the load drops
    overload_reported: bool,
    stats: ControllerStats,
}

impl TransportController {
    pub(crate) fn new(parts: ControllerParts) -> Self {
        let ready = Vec::with_capacity(parts.queue.capacity());
        let mut controller = Self {
            clock_source: parts.clock_source,
            clock: parts.clock,
            pattern: Pattern::new(0, "Empty".to_string()),
            lookahead: parts.lookahead,
            queue: parts.queue,
            batcher: parts.batcher,
            broadcaster: parts.broadcaster,
            performance: parts.performance,
            commands: parts.commands,
            reports: parts.reports,
            notifications: parts.notifications,
            ready,
            snapshot_pending: true,
            exhaustion_reported: false,
            overload_reported: false,
            stats: ControllerStats::default(),
        };
        // Configuration changes made while building are not schedule changes
        controller.clock.drain_changes().for_each(drop);
        controller
    }

    pub fn now(&self) -> f64 {
        self.clock_source.now()
    }

    // ---- Transport ----
    //
    // Every mutation first absorbs pending render reports so it acts on the
    // latest confirmed position.

    pub fn play(&mut self, from_step: Option<f64>) -> StepPosition {
        self.drain_reports();
        let now = self.now();
        let from = self.clock.play(from_step, now);
        log::info!("Play from step {}", from);
        self.apply_changes(now);
        from
    }

    pub fn stop(&mut self) {
        self.drain_reports();
        let now = self.now();
        self.clock.stop(now);
        log::info!("Stop");
        self.apply_changes(now);
    }

    pub fn pause(&mut self) -> StepPosition {
        self.drain_reports();
        let now = self.now();
        let at = self.clock.pause(now);
        log::info!("Pause at step {}", at);
        self.apply_changes(now);
        at
    }

    pub fn seek(&mut self, step: f64) -> StepPosition {
        self.drain_reports();
        let now = self.now();
        let to = self.clock.seek(step, now);
        log::debug!("Seek to step {}", to);
        self.apply_changes(now);
        to
    }

    pub fn set_tempo(&mut self, bpm: f64) -> Result<(), TransportError> {
        self.drain_reports();
        let now = self.now();
        self.clock.set_tempo(bpm, now)?;
        log::info!("Tempo {} BPM", bpm);
        self.apply_changes(now);
        Ok(())
    }

    pub fn set_loop(
        &mut self,
        start_step: f64,
        end_step: f64,
        enabled: bool,
    ) -> Result<(), TransportError> {
        self.drain_reports();
        let now = self.now();
        self.clock.set_loop(start_step, end_step, enabled, now)?;
        log::info!(
            "Loop {}..{} {}",
            start_step,
            end_step,
            if enabled { "on" } else { "off" }
        );
        self.apply_changes(now);
        Ok(())
    }

    pub fn set_loop_enabled(&mut self, enabled: bool) -> Result<(), TransportError> {
        self.drain_reports();
        let now = self.now();
        self.clock.set_loop_enabled(enabled, now)?;
        self.apply_changes(now);
        Ok(())
    }

    pub fn state(&self) -> TransportState {
        self.clock.state()
    }

    pub fn position(&self) -> StepPosition {
        self.clock.position()
    }

    pub fn generation(&self) -> u64 {
        self.clock.generation()
    }

    pub fn snapshot(&self) -> TransportSnapshot {
        self.clock.snapshot(self.now())
    }

    // ---- Content ----

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn set_pattern(&mut self, pattern: Pattern) {
        log::info!(
            "Pattern '{}' loaded ({} notes, {} automation points)",
            pattern.name,
            pattern.notes().len(),
            pattern.automation().len()
        );
        self.pattern = pattern;
        self.content_changed();
    }

    /// Edit the pattern in place; scheduling restarts from the playhead
    pub fn edit_pattern<R>(&mut self, edit: impl FnOnce(&mut Pattern) -> R) -> R {
        let result = edit(&mut self.pattern);
        self.content_changed();
        result
    }

    fn content_changed(&mut self) {
        if self.clock.state().is_playing() {
            self.drain_reports();
            let now = self.now();
            self.clock.rearm(now);
            self.apply_changes(now);
        }
    }

    // ---- Parameters ----

    /// Queue a parameter change for the render side
    pub fn set_parameter(
        &mut self,
        target: TargetId,
        key: &str,
        value: f32,
        options: SetOptions,
    ) -> usize {
        let now = self.now();
        self.batcher
            .set_parameter(target, key, value, options, now, &mut self.commands)
    }

    pub fn batcher(&self) -> &ParameterBatcher {
        &self.batcher
    }

    // ---- UI sync ----

    pub fn subscribe(&mut self, id: impl Into<String>, config: SyncConfig, callback: SyncCallback) {
        self.broadcaster.subscribe(id, config, callback);
    }

    pub fn unsubscribe(&mut self, id: &str) -> bool {
        self.broadcaster.unsubscribe(id)
    }

    // ---- Performance ----

    pub fn performance_status(&self) -> PerformanceStatus {
        self.performance.status()
    }

    pub fn performance_stats(&self) -> PerformanceStats {
        self.performance.stats()
    }

    pub fn suggest_level(&mut self) -> RenderLevel {
        let now = self.now();
        self.performance.suggest_level(now)
    }

    pub fn lookahead_state(&self) -> LookaheadState {
        self.lookahead.state()
    }

    // ---- Diagnostics ----

    pub fn stats(&self) -> ControllerStats {
        self.stats
    }

    /// Events materialized but not handed to the render side yet
    pub fn queued_events(&self) -> usize {
        self.queue.len()
    }

    /// Events handed to the render side and not acknowledged yet
    pub fn in_flight_events(&self) -> usize {
        self.queue.in_flight()
    }

    /// Ask the render side to stop processing
    pub fn shutdown(&mut self) -> bool {
        log::info!("Shutdown requested");
        self.commands.try_push(Command::Shutdown).is_ok()
    }

    // ---- Scheduling tick ----

    /// One scheduling step
    ///
    /// Absorbs render reports, extends the schedule to `now + window`,
    /// hands due events to the render side, flushes parameter batches and
    /// publishes the position to UI subscribers.
    pub fn tick(&mut self) -> TickReport {
        let now = self.now();
        self.drain_reports();
        self.apply_changes(now);
        if self.snapshot_pending {
            self.send_snapshot(now);
        }

        let mut report = TickReport {
            now,
            window: self.lookahead.current_window(),
            materialized: 0,
            dispatched: 0,
            position: self.clock.position(),
            generation: self.clock.generation(),
        };

        if self.clock.state().is_playing() {
            let density = self.pattern.event_density(
                self.clock.position(),
                StepPosition::from_steps(DENSITY_SPAN_STEPS),
            );
            let window = self.lookahead.compute_window(
                self.clock.tempo().bpm(),
                density,
                self.performance.load_percent(),
            );
            let horizon = now + window;
            report.window = window;
            report.materialized = self.materialize(horizon, now);
            report.dispatched = self.dispatch(horizon);
        }

        self.batcher.flush_all(&mut self.commands);

        let snapshot = self.clock.snapshot(now);
        self.broadcaster.publish(now, &snapshot);
        report
    }

    fn materialize(&mut self, horizon: f64, now: f64) -> usize {
        let snapshot = self.clock.snapshot(now);
        match self.queue.materialize_up_to(horizon, &snapshot, &self.pattern) {
            Ok(count) => {
                self.exhaustion_reported = false;
                self.stats.materialized += count as u64;
                count
            }
            Err(ScheduleError::PoolExhausted {
                dropped,
                materialized,
                capacity,
            }) => {
                self.stats.materialized += materialized as u64;
                self.stats.dropped += dropped as u64;
                if !self.exhaustion_reported {
                    self.exhaustion_reported = true;
                    log::warn!(
                        "Event pool exhausted (capacity {}): {} event(s) dropped",
                        capacity,
                        dropped
                    );
                    self.notify(Escalation::EventsDropped { dropped, capacity });
                }
                materialized
            }
            Err(e) => {
                log::error!("Materialization failed: {}", e);
                0
            }
        }
    }

    fn dispatch(&mut self, horizon: f64) -> usize {
        self.ready.clear();
        self.queue.pop_ready(horizon, &mut self.ready);

        let mut dispatched = 0;
        let mut undelivered = 0;
        for ready in self.ready.drain(..) {
            if self.commands.try_push(Command::Schedule(ready)).is_ok() {
                dispatched += 1;
                continue;
            }
            // Never reached the render side: give the slot back
            undelivered += 1;
            if let Err(e) = self.queue.acknowledge(ready.handle) {
                log::error!("Releasing undelivered event: {}", e);
            }
        }
        if undelivered > 0 {
            log::warn!("Command channel full, {} event(s) dropped", undelivered);
            self.notify(Escalation::EventsUndelivered {
                dropped: undelivered,
            });
        }
        self.stats.dropped += undelivered;
        self.stats.dispatched += dispatched as u64;
        dispatched
    }

    fn drain_reports(&mut self) {
        while let Some(report) = self.reports.try_pop() {
            match report {
                RenderReport::Acknowledged(handle) => match self.queue.acknowledge(handle) {
                    Ok(()) => self.stats.acknowledged += 1,
                    // A release defect: reported, second release ignored
                    Err(e) => log::error!("Acknowledgement rejected: {}", e),
                },
                RenderReport::PositionConfirmed(confirmation) => {
                    self.clock.confirm(confirmation);
                }
                RenderReport::CycleTimed { duration, budget } => {
                    if budget != self.performance.budget() {
                        self.performance.set_budget(budget);
                    }
                    self.performance.record_cycle(duration);
                    self.check_overload();
                }
                RenderReport::VoicesExhausted { dropped } => {
                    self.stats.voices_starved += u64::from(dropped);
                    log::warn!("Voice pool exhausted: {} note(s) not triggered", dropped);
                    self.notify(Escalation::VoicesBusy { dropped });
                }
                RenderReport::PendingOverflow { dropped } => {
                    self.stats.dropped += u64::from(dropped);
                    log::warn!("Render event buffer full: {} event(s) dropped", dropped);
                    self.notify(Escalation::EventsUndelivered {
                        dropped: u64::from(dropped),
                    });
                }
                RenderReport::SpentBatch(batch) => drop(batch),
            }
        }
    }

    /// React to clock mutations: cancel the old schedule and resync the render side
    fn apply_changes(&mut self, now: f64) {
        let mut invalidated = false;
        for change in self.clock.drain_changes() {
            invalidated |= change.invalidates_schedule();
            if change.is_discontinuity() {
                self.lookahead.on_position_change();
            }
        }
        if !invalidated {
            return;
        }

        let cancelled = self.queue.cancel_all();
        self.queue.reclaim_cancelled();
        self.queue.rearm();
        if cancelled > 0 {
            log::debug!("Cancelled {} scheduled event(s)", cancelled);
        }
        self.send_snapshot(now);
        self.broadcaster.force();
    }

    fn send_snapshot(&mut self, now: f64) {
        let snapshot = self.clock.snapshot(now);
        self.snapshot_pending = self.commands.try_push(Command::Snapshot(snapshot)).is_err();
        if self.snapshot_pending {
            log::warn!("Command channel full, transport snapshot deferred");
        }
    }

    /// Escalate once per entry into the critical band
    fn check_overload(&mut self) {
        let critical = self.performance.status() == PerformanceStatus::Critical;
        if critical && !self.overload_reported {
            let load_percent = self.performance.load_percent();
            log::warn!("Render load critical: {:.0}% of budget", load_percent);
            self.notify(Escalation::Overloaded { load_percent });
        }
        self.overload_reported = critical;
    }

    fn notify(&mut self, escalation: Escalation) {
        let notification = Notification::new(escalation, self.now());
        // UI may be slow to drain; dropping a notification is fine
        let _ = self.notifications.try_push(notification);
    }
}
