// Transport - Playback control and the authoritative position clock
// The clock lives in the control domain; everything else reads snapshots

use super::timeline::{LoopRegion, StepPosition, Tempo};
use thiserror::Error;

/// Transport state (play/stop/pause)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl TransportState {
    pub fn is_playing(&self) -> bool {
        matches!(self, TransportState::Playing)
    }

    /// Check if transport is stopped or paused
    pub fn is_stopped(&self) -> bool {
        matches!(self, TransportState::Stopped | TransportState::Paused)
    }
}

/// Transport-related errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransportError {
    #[error("Invalid seek target {requested}, clamped to step {clamped}")]
    InvalidSeek { requested: f64, clamped: f64 },

    #[error("Invalid loop region: end {end} must be after start {start}")]
    InvalidLoop { start: f64, end: f64 },

    #[error("Invalid tempo: {0} BPM")]
    InvalidTempo(f64),
}

/// Notification emitted by every clock mutation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PositionChange {
    Started { from: StepPosition },
    Paused { at: StepPosition },
    Stopped,
    Seeked { to: StepPosition },
    /// Tempo or loop configuration changed; scheduling restarts from `at`
    Rearmed { at: StepPosition },
}

impl PositionChange {
    /// Whether events materialized before this change are now invalid
    pub fn invalidates_schedule(&self) -> bool {
        // Every variant bumps the generation
        true
    }

    /// Whether the playhead jumped (density history no longer applies)
    pub fn is_discontinuity(&self) -> bool {
        matches!(
            self,
            PositionChange::Seeked { .. } | PositionChange::Stopped | PositionChange::Started { .. }
        )
    }
}

/// Position report sent by the rendering domain after each cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionConfirmation {
    /// Generation of the snapshot the cycle was rendered with
    pub generation: u64,
    /// Rendering clock time (seconds) up to which audio has been produced
    pub rendered_until: f64,
}

/// Derived, read-only view of the transport
///
/// Snapshots are what the rendering domain and UI consumers hold. They are
/// never written back into the clock; `observed_at` and `generation` tell
/// how old the view is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportSnapshot {
    state: TransportState,
    generation: u64,
    observed_at: f64,
    bpm: f64,
    steps_per_beat: u32,
    loop_region: Option<LoopRegion>,
    anchor_ticks: u64,
    anchor_time: f64,
    confirmed_ticks: u64,
    confirmed_at: f64,
}

impl TransportSnapshot {
    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state.is_playing()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn observed_at(&self) -> f64 {
        self.observed_at
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn steps_per_beat(&self) -> u32 {
        self.steps_per_beat
    }

    /// Active loop region (`None` when looping is disabled)
    pub fn loop_region(&self) -> Option<LoopRegion> {
        self.loop_region
    }

    /// Origin of the unwrapped tick line for the current generation
    pub fn anchor(&self) -> StepPosition {
        StepPosition::from_ticks(self.anchor_ticks)
    }

    pub fn anchor_time(&self) -> f64 {
        self.anchor_time
    }

    pub fn ticks_per_second(&self) -> f64 {
        Tempo::new(self.bpm).ticks_per_second(self.steps_per_beat)
    }

    /// Apply the loop rule to an unwrapped position
    pub fn wrap(&self, unwrapped: StepPosition) -> StepPosition {
        match self.loop_region {
            Some(region) => region.wrap(unwrapped),
            None => unwrapped,
        }
    }

    /// Last confirmed position (wrapped)
    pub fn position(&self) -> StepPosition {
        self.wrap(StepPosition::from_ticks(self.confirmed_ticks))
    }

    /// Last confirmed position on the unwrapped tick line
    pub fn unwrapped_position(&self) -> StepPosition {
        StepPosition::from_ticks(self.confirmed_ticks)
    }

    /// Clock time of an unwrapped tick for this generation
    pub fn time_of(&self, unwrapped_ticks: u64) -> f64 {
        let delta = unwrapped_ticks as f64 - self.anchor_ticks as f64;
        self.anchor_time + delta / self.ticks_per_second()
    }

    /// Unwrapped tick reached at clock time `time` (floored)
    pub fn ticks_at(&self, time: f64) -> u64 {
        let elapsed = (time - self.anchor_time).max(0.0);
        self.anchor_ticks
            .saturating_add((elapsed * self.ticks_per_second()).floor() as u64)
    }

    /// Unwrapped position extrapolated from the last confirmation
    pub fn unwrapped_position_at(&self, now: f64) -> StepPosition {
        if !self.is_playing() {
            return self.unwrapped_position();
        }
        let elapsed = (now - self.confirmed_at).max(0.0);
        let ticks = self
            .confirmed_ticks
            .saturating_add((elapsed * self.ticks_per_second()).floor() as u64);
        StepPosition::from_ticks(ticks)
    }

    /// Wrapped position extrapolated from the last confirmation
    pub fn position_at(&self, now: f64) -> StepPosition {
        self.wrap(self.unwrapped_position_at(now))
    }
}

/// The single authoritative transport position
///
/// Mutated only through `play`, `stop`, `pause`, `seek` and the tempo/loop
/// setters (which re-anchor like a seek). The rendering domain moves the
/// confirmed position forward with `confirm`; it never writes it directly.
#[derive(Debug)]
pub struct PositionClock {
    state: TransportState,
    tempo: Tempo,
    steps_per_beat: u32,
    loop_region: Option<LoopRegion>,
    loop_enabled: bool,
    generation: u64,
    anchor_ticks: u64,
    anchor_time: f64,
    confirmed_ticks: u64,
    confirmed_at: f64,
    changes: Vec<PositionChange>,
}

impl PositionClock {
    pub fn new(tempo: Tempo, steps_per_beat: u32) -> Self {
        Self {
            state: TransportState::Stopped,
            tempo,
            steps_per_beat: steps_per_beat.max(1),
            loop_region: None,
            loop_enabled: false,
            generation: 0,
            anchor_ticks: 0,
            anchor_time: 0.0,
            confirmed_ticks: 0,
            confirmed_at: 0.0,
            changes: Vec::with_capacity(8),
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn tempo(&self) -> Tempo {
        self.tempo
    }

    pub fn steps_per_beat(&self) -> u32 {
        self.steps_per_beat
    }

    /// Transport epoch, bumped by every mutation
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    /// Configured loop region, whether or not it is enabled
    pub fn loop_region(&self) -> Option<LoopRegion> {
        self.loop_region
    }

    fn active_loop(&self) -> Option<LoopRegion> {
        self.loop_region.filter(|_| self.loop_enabled)
    }

    fn wrap(&self, position: StepPosition) -> StepPosition {
        match self.active_loop() {
            Some(region) => region.wrap(position),
            None => position,
        }
    }

    fn ticks_per_second(&self) -> f64 {
        self.tempo.ticks_per_second(self.steps_per_beat)
    }

    /// Current position (last confirmed, loop rule applied)
    pub fn position(&self) -> StepPosition {
        self.wrap(StepPosition::from_ticks(self.confirmed_ticks))
    }

    /// Where the render side is now, under the current tempo and loop rule
    ///
    /// While playing this extrapolates from the anchor, rounding up so
    /// nothing the render side already played is scheduled again. Never
    /// behind the last confirmation.
    fn playhead(&self, now: f64) -> StepPosition {
        if !self.state.is_playing() {
            return self.position();
        }
        let elapsed = (now - self.anchor_time).max(0.0);
        let ticks = self
            .anchor_ticks
            .saturating_add((elapsed * self.ticks_per_second()).ceil() as u64)
            .max(self.confirmed_ticks)
            .min(StepPosition::MAX.ticks());
        self.wrap(StepPosition::from_ticks(ticks))
    }

    /// Validate a requested step, clamping bad input into range
    fn sanitize(requested: f64) -> StepPosition {
        if let Some(position) = StepPosition::from_steps_f64(requested) {
            return position;
        }
        let clamped = if requested.is_finite() && requested > 0.0 {
            StepPosition::MAX
        } else {
            StepPosition::ZERO
        };
        log::warn!(
            "{}",
            TransportError::InvalidSeek {
                requested,
                clamped: clamped.as_steps_f64(),
            }
        );
        clamped
    }

    fn anchor_at(&mut self, position: StepPosition, now: f64) {
        self.anchor_ticks = position.ticks();
        self.anchor_time = now;
        self.confirmed_ticks = position.ticks();
        self.confirmed_at = now;
        self.generation += 1;
    }

    /// Start playback, from `from_step` or from the current position
    pub fn play(&mut self, from_step: Option<f64>, now: f64) -> StepPosition {
        let from = match from_step {
            Some(step) => Self::sanitize(step),
            None if self.state.is_playing() => return self.position(),
            None => self.position(),
        };

        self.state = TransportState::Playing;
        self.anchor_at(from, now);
        log::debug!("Transport playing from step {}", from);
        self.changes.push(PositionChange::Started { from });
        from
    }

    /// Stop playback; the position always returns to step 0
    pub fn stop(&mut self, now: f64) {
        self.state = TransportState::Stopped;
        self.anchor_at(StepPosition::ZERO, now);
        log::debug!("Transport stopped");
        self.changes.push(PositionChange::Stopped);
    }

    /// Pause playback at the last rendering-confirmed position
    pub fn pause(&mut self, now: f64) -> StepPosition {
        let at = self.position();
        if !self.state.is_playing() {
            return at;
        }

        self.state = TransportState::Paused;
        self.anchor_at(at, now);
        log::debug!("Transport paused at step {}", at);
        self.changes.push(PositionChange::Paused { at });
        at
    }

    /// Move the playhead; legal in every state
    pub fn seek(&mut self, step: f64, now: f64) -> StepPosition {
        let to = Self::sanitize(step);
        self.anchor_at(to, now);
        self.changes.push(PositionChange::Seeked { to });
        to
    }

    /// Change tempo, re-anchoring at the current position
    pub fn set_tempo(&mut self, bpm: f64, now: f64) -> Result<(), TransportError> {
        let tempo = Tempo::try_new(bpm).ok_or(TransportError::InvalidTempo(bpm))?;
        if tempo == self.tempo {
            return Ok(());
        }
        // Measured under the old tempo
        let at = self.playhead(now);
        self.tempo = tempo;
        self.reanchor(at, now);
        Ok(())
    }

    /// Configure the loop region
    pub fn set_loop(
        &mut self,
        start_step: f64,
        end_step: f64,
        enabled: bool,
        now: f64,
    ) -> Result<(), TransportError> {
        let invalid = || TransportError::InvalidLoop {
            start: start_step,
            end: end_step,
        };
        let start = StepPosition::from_steps_f64(start_step).ok_or_else(invalid)?;
        let end = StepPosition::from_steps_f64(end_step).ok_or_else(invalid)?;
        let region = LoopRegion::new(start, end).ok_or_else(invalid)?;

        if self.loop_region == Some(region) && self.loop_enabled == enabled {
            return Ok(());
        }
        // Keep the playhead where the listener hears it before the rule changes
        let at = self.playhead(now);
        self.loop_region = Some(region);
        self.loop_enabled = enabled;
        self.reanchor(at, now);
        Ok(())
    }

    /// Toggle looping on the configured region
    pub fn set_loop_enabled(&mut self, enabled: bool, now: f64) -> Result<(), TransportError> {
        match self.loop_region {
            Some(region) => self.set_loop(
                region.start().as_steps_f64(),
                region.end().as_steps_f64(),
                enabled,
                now,
            ),
            None if enabled => Err(TransportError::InvalidLoop {
                start: 0.0,
                end: 0.0,
            }),
            None => Ok(()),
        }
    }

    /// Re-anchor at the current playhead (tempo, loop or content changed)
    pub fn rearm(&mut self, now: f64) {
        let at = self.playhead(now);
        self.reanchor(at, now);
    }

    fn reanchor(&mut self, at: StepPosition, now: f64) {
        let anchor_time = if self.state.is_playing() {
            now
        } else {
            self.anchor_time
        };
        self.anchor_at(at, anchor_time);
        self.changes.push(PositionChange::Rearmed { at });
    }

    /// Accept a rendering-domain position report
    ///
    /// Returns `false` for reports from an older generation or while not
    /// playing. The confirmed position never moves backward.
    pub fn confirm(&mut self, confirmation: PositionConfirmation) -> bool {
        if !self.state.is_playing() || confirmation.generation != self.generation {
            return false;
        }
        let elapsed = (confirmation.rendered_until - self.anchor_time).max(0.0);
        let ticks = self
            .anchor_ticks
            .saturating_add((elapsed * self.ticks_per_second()).floor() as u64);
        if ticks > self.confirmed_ticks {
            self.confirmed_ticks = ticks;
            self.confirmed_at = confirmation.rendered_until;
        }
        true
    }

    /// Move the confirmed position forward by a musical amount
    ///
    /// Used by offline rendering, where progress is counted in steps instead
    /// of clock time. No effect unless playing.
    pub fn advance(&mut self, delta: StepPosition) -> StepPosition {
        if self.state.is_playing() {
            self.confirmed_ticks = self.confirmed_ticks.saturating_add(delta.ticks());
            self.confirmed_at = self.anchor_time
                + self.confirmed_ticks.saturating_sub(self.anchor_ticks) as f64
                    / self.ticks_per_second();
        }
        self.position()
    }

    /// Derived view for other components
    pub fn snapshot(&self, now: f64) -> TransportSnapshot {
        TransportSnapshot {
            state: self.state,
            generation: self.generation,
            observed_at: now,
            bpm: self.tempo.bpm(),
            steps_per_beat: self.steps_per_beat,
            loop_region: self.active_loop(),
            anchor_ticks: self.anchor_ticks,
            anchor_time: self.anchor_time,
            confirmed_ticks: self.confirmed_ticks,
            confirmed_at: self.confirmed_at,
        }
    }

    /// Drain pending position-change notifications
    pub fn drain_changes(&mut self) -> std::vec::Drain<'_, PositionChange> {
        self.changes.drain(..)
    }
}

impl Default for PositionClock {
    fn default() -> Self {
        Self::new(Tempo::default(), 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(n: u64) -> StepPosition {
        StepPosition::from_steps(n)
    }

    #[test]
    fn test_transport_state() {
        assert!(TransportState::Playing.is_playing());
        assert!(!TransportState::Playing.is_stopped());
        assert!(TransportState::Paused.is_stopped());
        assert_eq!(TransportState::default(), TransportState::Stopped);
    }

    #[test]
    fn test_transport_control() {
        let mut clock = PositionClock::default();
        assert_eq!(clock.state(), TransportState::Stopped);

        clock.play(None, 0.0);
        assert_eq!(clock.state(), TransportState::Playing);

        clock.pause(1.0);
        assert_eq!(clock.state(), TransportState::Paused);

        clock.stop(2.0);
        assert_eq!(clock.state(), TransportState::Stopped);
        assert_eq!(clock.position(), StepPosition::ZERO);
    }

    #[test]
    fn test_loop_wrap_scenario() {
        let mut clock = PositionClock::new(Tempo::new(120.0), 4);
        clock.set_loop(0.0, 64.0, true, 0.0).unwrap();
        clock.play(Some(60.0), 0.0);

        let position = clock.advance(steps(8));
        assert_eq!(position, steps(4));
    }

    #[test]
    fn test_stop_ignores_loop_start() {
        let mut clock = PositionClock::default();
        clock.set_loop(16.0, 32.0, true, 0.0).unwrap();
        clock.play(Some(20.0), 0.0);
        clock.advance(steps(30));
        clock.stop(1.0);
        assert_eq!(clock.position(), StepPosition::ZERO);
    }

    #[test]
    fn test_confirm_moves_position() {
        let mut clock = PositionClock::new(Tempo::new(120.0), 4);
        clock.play(Some(0.0), 10.0);

        // 120 BPM, 4 steps per beat: 8 steps per second
        let accepted = clock.confirm(PositionConfirmation {
            generation: clock.generation(),
            rendered_until: 10.5,
        });
        assert!(accepted);
        assert_eq!(clock.position(), steps(4));
    }

    #[test]
    fn test_confirm_rejects_stale_generation() {
        let mut clock = PositionClock::default();
        clock.play(Some(0.0), 0.0);
        let old = clock.generation();
        clock.seek(32.0, 0.0);

        let accepted = clock.confirm(PositionConfirmation {
            generation: old,
            rendered_until: 1.0,
        });
        assert!(!accepted);
        assert_eq!(clock.position(), steps(32));
    }

    #[test]
    fn test_confirm_never_moves_backward() {
        let mut clock = PositionClock::default();
        clock.play(Some(0.0), 0.0);
        let generation = clock.generation();
        clock.confirm(PositionConfirmation { generation, rendered_until: 1.0 });
        clock.confirm(PositionConfirmation { generation, rendered_until: 0.5 });
        assert_eq!(clock.position(), steps(8));
    }

    #[test]
    fn test_pause_keeps_confirmed_position() {
        let mut clock = PositionClock::default();
        clock.play(Some(0.0), 0.0);
        let generation = clock.generation();
        clock.confirm(PositionConfirmation { generation, rendered_until: 0.25 });

        // The UI thinks we are further along, but only 2 steps were rendered
        let at = clock.pause(0.9);
        assert_eq!(at, steps(2));
        assert_eq!(clock.position(), steps(2));

        clock.play(None, 5.0);
        assert_eq!(clock.position(), steps(2));
    }

    #[test]
    fn test_seek_clamps_invalid_targets() {
        let mut clock = PositionClock::default();
        assert_eq!(clock.seek(-4.0, 0.0), StepPosition::ZERO);
        assert_eq!(clock.seek(f64::NAN, 0.0), StepPosition::ZERO);
        assert_eq!(clock.seek(12.5, 0.0), StepPosition::from_steps_f64(12.5).unwrap());
        assert_eq!(clock.seek(1e300, 0.0), StepPosition::MAX);
    }

    #[test]
    fn test_far_seek_keeps_running() {
        let mut clock = PositionClock::default();
        clock.play(Some(1e300), 0.0);
        assert_eq!(clock.position(), StepPosition::MAX);

        clock.advance(steps(4));
        let generation = clock.generation();
        assert!(clock.confirm(PositionConfirmation { generation, rendered_until: 60.0 }));
        assert!(clock.position() >= StepPosition::MAX);
        assert!(clock.snapshot(1e9).position_at(1e12) >= StepPosition::MAX);
    }

    #[test]
    fn test_tempo_change_keeps_playhead() {
        let mut clock = PositionClock::new(Tempo::new(120.0), 4);
        clock.play(Some(0.0), 0.0);
        let generation = clock.generation();
        // Render only confirmed up to step 2; it has actually reached step 4
        clock.confirm(PositionConfirmation { generation, rendered_until: 0.25 });

        clock.set_tempo(60.0, 0.5).unwrap();
        assert_eq!(clock.position(), steps(4));

        // The new tempo applies from the re-anchor on: 4 steps per second
        let generation = clock.generation();
        clock.confirm(PositionConfirmation { generation, rendered_until: 1.5 });
        assert_eq!(clock.position(), steps(8));
    }

    #[test]
    fn test_rearm_never_moves_backward() {
        let mut clock = PositionClock::new(Tempo::new(120.0), 4);
        clock.play(Some(0.0), 0.0);
        let generation = clock.generation();
        clock.confirm(PositionConfirmation { generation, rendered_until: 1.0 });

        // A stale `now` must not pull the playhead behind the confirmation
        clock.rearm(0.5);
        assert_eq!(clock.position(), steps(8));
        assert_eq!(
            clock.drain_changes().last(),
            Some(PositionChange::Rearmed { at: steps(8) })
        );
    }

    #[test]
    fn test_loop_change_keeps_playhead() {
        let mut clock = PositionClock::new(Tempo::new(120.0), 4);
        clock.play(Some(0.0), 0.0);

        clock.set_loop(0.0, 32.0, true, 1.0).unwrap();
        assert_eq!(clock.position(), steps(8));
    }

    #[test]
    fn test_seek_past_loop_end_reconciles() {
        let mut clock = PositionClock::default();
        clock.set_loop(0.0, 16.0, true, 0.0).unwrap();
        clock.seek(20.0, 0.0);
        assert_eq!(clock.position(), steps(4));
    }

    #[test]
    fn test_mutations_bump_generation() {
        let mut clock = PositionClock::default();
        let start = clock.generation();
        clock.play(None, 0.0);
        clock.seek(4.0, 0.0);
        clock.pause(0.0);
        clock.stop(0.0);
        assert_eq!(clock.generation(), start + 4);
    }

    #[test]
    fn test_changes_published() {
        let mut clock = PositionClock::default();
        clock.play(Some(2.0), 0.0);
        clock.seek(8.0, 0.0);
        clock.stop(0.0);

        let changes: Vec<PositionChange> = clock.drain_changes().collect();
        assert_eq!(
            changes,
            vec![
                PositionChange::Started { from: steps(2) },
                PositionChange::Seeked { to: steps(8) },
                PositionChange::Stopped,
            ]
        );
        assert_eq!(clock.drain_changes().count(), 0);
    }

    #[test]
    fn test_invalid_loop_rejected() {
        let mut clock = PositionClock::default();
        assert!(matches!(
            clock.set_loop(8.0, 8.0, true, 0.0),
            Err(TransportError::InvalidLoop { .. })
        ));
        assert!(clock.set_loop_enabled(true, 0.0).is_err());
        assert!(!clock.is_loop_enabled());
    }

    #[test]
    fn test_set_tempo() {
        let mut clock = PositionClock::default();
        assert!(clock.set_tempo(140.0, 0.0).is_ok());
        assert_eq!(clock.tempo().bpm(), 140.0);
        assert_eq!(clock.set_tempo(5.0, 0.0), Err(TransportError::InvalidTempo(5.0)));
    }

    #[test]
    fn test_snapshot_interpolation() {
        let mut clock = PositionClock::new(Tempo::new(120.0), 4);
        clock.set_loop(0.0, 16.0, true, 0.0).unwrap();
        clock.play(Some(12.0), 0.0);

        let snapshot = clock.snapshot(0.0);
        assert_eq!(snapshot.position_at(1.0), steps(4));
        assert_eq!(snapshot.unwrapped_position_at(1.0), steps(20));
        assert_eq!(snapshot.time_of(steps(20).ticks()), 1.0);
        assert_eq!(snapshot.ticks_at(1.0), steps(20).ticks());
    }
}
