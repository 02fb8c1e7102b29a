// Render transport - Rendering-domain end of the scheduler
//
// Runs inside the audio callback: no allocation, no locks, no logging.
// Everything it learns goes back to the control domain as `RenderReport`s.

use crate::audio::performance::CycleMeter;
use crate::audio::pool::{ObjectPool, PoolHandle, Poolable, ScratchBuffer};
use crate::audio::timing::AudioTiming;
use crate::messaging::batcher::ParameterBatch;
use crate::messaging::channels::{CommandConsumer, ReportProducer};
use crate::messaging::command::{Command, RenderReport};
use crate::scheduling::event::{EventKind, EventPayload, NotePayload};
use crate::scheduling::queue::ReadyEvent;
use crate::sequencer::note::TargetId;
use crate::sequencer::timeline::StepPosition;
use crate::sequencer::transport::{PositionConfirmation, TransportSnapshot};
use ringbuf::traits::{Consumer, Producer};
use std::time::Duration;

/// Instrument/mixer boundary
///
/// `frame_offset` is the sample offset of the event inside the current cycle.
pub trait EventSink {
    fn note_on(&mut self, note: NotePayload, frame_offset: u32);

    fn note_off(&mut self, note: NotePayload, frame_offset: u32);

    fn automation(&mut self, target: TargetId, param: u32, value: f32, frame_offset: u32);

    fn loop_boundary(
        &mut self,
        _loop_start: StepPosition,
        _loop_end: StepPosition,
        _frame_offset: u32,
    ) {
    }

    fn apply_parameters(&mut self, batch: &ParameterBatch);

    /// Called once per cycle with a zeroed scratch buffer of up to `frames` samples
    fn render(&mut self, _buffer: &mut [f32]) {}
}

/// A sounding note
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Voice {
    pub note: Option<NotePayload>,
    /// Sample at which the note started
    pub started_at: u64,
}

impl Voice {
    fn plays(&self, note: &NotePayload) -> bool {
        self.note
            .is_some_and(|n| n.instrument_id == note.instrument_id && n.pitch == note.pitch)
    }
}

impl Poolable for Voice {
    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Fixed sizes for the render side
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSettings {
    pub voices: usize,
    /// Events received ahead of their cycle
    pub pending_capacity: usize,
    /// Event pool size on the control side; bounds the handles in flight
    pub event_capacity: usize,
    pub scratch_buffers: usize,
    pub buffer_size: usize,
    /// Time 1 out of N cycles
    pub measure_every_n: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            voices: 64,
            pending_capacity: 1024,
            event_capacity: 4096,
            scratch_buffers: 4,
            buffer_size: 512,
            measure_every_n: 4,
        }
    }
}

pub struct RenderTransport {
    timing: AudioTiming,
    commands: CommandConsumer,
    reports: ReportProducer,
    snapshot: Option<TransportSnapshot>,
    /// Sorted by (time, sequence id)
    pending: Vec<ReadyEvent>,
    voices: ObjectPool<Voice>,
    scratch: ObjectPool<ScratchBuffer>,
    meter: CycleMeter,
    /// Reports that did not fit in the channel, retried next cycle
    unsent_acks: Vec<PoolHandle>,
    unsent_batches: Vec<ParameterBatch>,
    voices_starved: u32,
    pending_overflow: u32,
    shutdown: bool,
}

impl RenderTransport {
    pub fn new(
        timing: AudioTiming,
        commands: CommandConsumer,
        reports: ReportProducer,
        settings: RenderSettings,
    ) -> Self {
        let buffer_size = settings.buffer_size.max(1);
        Self {
            timing,
            commands,
            reports,
            snapshot: None,
            pending: Vec::with_capacity(settings.pending_capacity),
            voices: ObjectPool::with_default("voices", settings.voices),
            scratch: ObjectPool::new("scratch", settings.scratch_buffers, || {
                ScratchBuffer::new(buffer_size)
            }),
            meter: CycleMeter::new(settings.measure_every_n),
            // Every in-flight handle fits, so an acknowledgement is never lost
            unsent_acks: Vec::with_capacity(
                settings.event_capacity.max(settings.pending_capacity),
            ),
            unsent_batches: Vec::with_capacity(16),
            voices_starved: 0,
            pending_overflow: 0,
            shutdown: false,
        }
    }

    pub fn timing(&self) -> &AudioTiming {
        &self.timing
    }

    pub fn snapshot(&self) -> Option<&TransportSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn active_voices(&self) -> usize {
        self.voices.active_count()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Run one render cycle of `frames` samples
    ///
    /// Returns `false` once the control side asked for shutdown.
    pub fn process(&mut self, frames: usize, sink: &mut impl EventSink) -> bool {
        let measure_start = self.meter.start_measure();
        let cycle_start = self.timing.current_sample();

        while let Some(command) = self.commands.try_pop() {
            match command {
                Command::Snapshot(snapshot) => self.apply_snapshot(snapshot, sink),
                Command::Schedule(ready) => self.enqueue(ready),
                Command::Parameters(batch) => {
                    sink.apply_parameters(&batch);
                    self.return_batch(batch);
                }
                Command::Shutdown => self.shutdown = true,
            }
        }

        let cycle_end = self
            .timing
            .samples_to_seconds(cycle_start + frames as u64);
        let due = self
            .pending
            .partition_point(|ready| ready.event.time_seconds < cycle_end);

        for index in 0..due {
            let ready = self.pending[index];
            if self.is_current(&ready) {
                let offset = self
                    .timing
                    .frame_offset(ready.event.time_seconds, cycle_start, frames);
                self.execute(&ready, offset, cycle_start, sink);
            }
            // Stale events are dropped silently but their slot still comes back
            self.acknowledge(ready.handle);
        }
        self.pending.drain(..due);

        if let Ok(handle) = self.scratch.acquire() {
            if let Some(buffer) = self.scratch.get_mut(handle) {
                let len = frames.min(buffer.len());
                sink.render(&mut buffer.as_mut_slice()[..len]);
            }
            let _ = self.scratch.release(handle);
        }

        self.timing.advance(frames);

        if let Some(snapshot) = self.snapshot.filter(|s| s.is_playing()) {
            self.report(RenderReport::PositionConfirmed(PositionConfirmation {
                generation: snapshot.generation(),
                rendered_until: self.timing.samples_to_seconds(cycle_start + frames as u64),
            }));
        }
        if self.voices_starved > 0 {
            let dropped = std::mem::take(&mut self.voices_starved);
            self.report(RenderReport::VoicesExhausted { dropped });
        }
        if self.pending_overflow > 0 {
            let dropped = std::mem::take(&mut self.pending_overflow);
            self.report(RenderReport::PendingOverflow { dropped });
        }
        self.flush_unsent();

        if let Some(duration) = self.meter.end_measure(measure_start) {
            let budget = Duration::from_secs_f64(self.timing.buffer_duration(frames));
            self.report(RenderReport::CycleTimed { duration, budget });
        }

        !self.shutdown
    }

    fn is_current(&self, ready: &ReadyEvent) -> bool {
        self.snapshot.is_some_and(|snapshot| {
            snapshot.is_playing() && snapshot.generation() == ready.event.generation
        })
    }

    fn apply_snapshot(&mut self, snapshot: TransportSnapshot, sink: &mut impl EventSink) {
        let discontinuity = self
            .snapshot
            .is_none_or(|previous| previous.generation() != snapshot.generation());
        self.snapshot = Some(snapshot);

        if discontinuity || !snapshot.is_playing() {
            // Note-offs for these voices may have been cancelled with the old schedule
            for (_, voice) in self.voices.iter_active() {
                if let Some(note) = voice.note {
                    sink.note_off(note, 0);
                }
            }
            self.voices.release_all();
        }
    }

    fn enqueue(&mut self, ready: ReadyEvent) {
        if self.pending.len() == self.pending.capacity() {
            self.pending_overflow += 1;
            self.acknowledge(ready.handle);
            return;
        }
        let index = self
            .pending
            .partition_point(|p| p.event.schedule_order(&ready.event).is_lt());
        self.pending.insert(index, ready);
    }

    fn execute(
        &mut self,
        ready: &ReadyEvent,
        offset: u32,
        cycle_start: u64,
        sink: &mut impl EventSink,
    ) {
        match (ready.event.kind, ready.event.payload) {
            (EventKind::NoteOn, EventPayload::Note(note)) => match self.voices.acquire() {
                Ok(handle) => {
                    if let Some(voice) = self.voices.get_mut(handle) {
                        voice.note = Some(note);
                        voice.started_at = cycle_start + u64::from(offset);
                    }
                    sink.note_on(note, offset);
                }
                // Under exhaustion new notes are simply not triggered
                Err(_) => self.voices_starved += 1,
            },
            (EventKind::NoteOff, EventPayload::Note(note)) => {
                if let Some(handle) = self.voices.find_active(|voice| voice.plays(&note)) {
                    let _ = self.voices.release(handle);
                    sink.note_off(note, offset);
                }
            }
            (EventKind::Automation, EventPayload::Automation { target, param, value }) => {
                sink.automation(target, param, value, offset);
            }
            (
                EventKind::LoopBoundary,
                EventPayload::LoopBoundary {
                    loop_start,
                    loop_end,
                },
            ) => sink.loop_boundary(loop_start, loop_end, offset),
            _ => {}
        }
    }

    fn acknowledge(&mut self, handle: PoolHandle) {
        if let Err(RenderReport::Acknowledged(handle)) =
            self.reports.try_push(RenderReport::Acknowledged(handle))
        {
            if self.unsent_acks.len() < self.unsent_acks.capacity() {
                self.unsent_acks.push(handle);
            }
        }
    }

    fn return_batch(&mut self, batch: ParameterBatch) {
        if let Err(RenderReport::SpentBatch(batch)) =
            self.reports.try_push(RenderReport::SpentBatch(batch))
        {
            if self.unsent_batches.len() < self.unsent_batches.capacity() {
                self.unsent_batches.push(batch);
            }
        }
    }

    fn report(&mut self, report: RenderReport) {
        // Confirmations and timings are superseded by the next cycle
        let _ = self.reports.try_push(report);
    }

    fn flush_unsent(&mut self) {
        while let Some(&handle) = self.unsent_acks.last() {
            if self.reports.try_push(RenderReport::Acknowledged(handle)).is_err() {
                return;
            }
            self.unsent_acks.pop();
        }
        while let Some(batch) = self.unsent_batches.pop() {
            if let Err(RenderReport::SpentBatch(batch)) =
                self.reports.try_push(RenderReport::SpentBatch(batch))
            {
                self.unsent_batches.push(batch);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::channels::{create_command_channel, create_report_channel};
    use crate::messaging::channels::{CommandProducer, ReportConsumer};
    use crate::scheduling::event::ScheduledEvent;
    use crate::sequencer::transport::PositionClock;

    const SAMPLE_RATE: f32 = 48000.0;
    const FRAMES: usize = 480; // 10 ms

    #[derive(Debug, Default)]
    struct RecordingSink {
        log: Vec<(EventKind, u8, u32)>,
        batches: Vec<u32>,
        rendered: usize,
    }

    impl EventSink for RecordingSink {
        fn note_on(&mut self, note: NotePayload, frame_offset: u32) {
            self.log.push((EventKind::NoteOn, note.pitch, frame_offset));
        }

        fn note_off(&mut self, note: NotePayload, frame_offset: u32) {
            self.log.push((EventKind::NoteOff, note.pitch, frame_offset));
        }

        fn automation(&mut self, _target: TargetId, _param: u32, _value: f32, frame_offset: u32) {
            self.log.push((EventKind::Automation, 0, frame_offset));
        }

        fn apply_parameters(&mut self, batch: &ParameterBatch) {
            self.batches.push(batch.target);
        }

        fn render(&mut self, buffer: &mut [f32]) {
            assert!(buffer.iter().all(|s| *s == 0.0));
            buffer.fill(0.25);
            self.rendered += buffer.len();
        }
    }

    struct Harness {
        render: RenderTransport,
        commands: CommandProducer,
        reports: ReportConsumer,
        clock: PositionClock,
        events: ObjectPool<ScheduledEvent>,
        next_sequence_id: u64,
    }

    impl Harness {
        fn new(voices: usize) -> Self {
            Self::with_report_capacity(voices, 256)
        }

        fn with_report_capacity(voices: usize, report_capacity: usize) -> Self {
            let (commands, command_rx) = create_command_channel(64);
            let (report_tx, reports) = create_report_channel(report_capacity);
            let settings = RenderSettings {
                voices,
                pending_capacity: 16,
                event_capacity: 64,
                scratch_buffers: 1,
                buffer_size: FRAMES,
                measure_every_n: 1,
            };
            let render = RenderTransport::new(
                AudioTiming::new(SAMPLE_RATE),
                command_rx,
                report_tx,
                settings,
            );
            let mut clock = PositionClock::default();
            clock.play(Some(0.0), 0.0);
            let mut harness = Self {
                render,
                commands,
                reports,
                clock,
                events: ObjectPool::with_default("events", 64),
                next_sequence_id: 0,
            };
            harness.send_snapshot();
            harness
        }

        fn send_snapshot(&mut self) {
            let snapshot = self.clock.snapshot(0.0);
            let _ = self.commands.try_push(Command::Snapshot(snapshot));
        }

        fn schedule(&mut self, kind: EventKind, pitch: u8, time_seconds: f64) -> PoolHandle {
            let handle = self.events.acquire().unwrap();
            self.next_sequence_id += 1;
            let event = ScheduledEvent {
                time_seconds,
                kind,
                payload: EventPayload::Note(NotePayload {
                    instrument_id: 0,
                    pitch,
                    velocity: 100,
                }),
                sequence_id: self.next_sequence_id,
                generation: self.clock.generation(),
                ..Default::default()
            };
            let _ = self
                .commands
                .try_push(Command::Schedule(ReadyEvent { handle, event }));
            handle
        }

        fn drain_reports(&mut self) -> Vec<RenderReport> {
            let mut out = Vec::new();
            while let Some(report) = self.reports.try_pop() {
                out.push(report);
            }
            out
        }
    }

    #[test]
    fn test_events_execute_in_their_cycle() {
        let mut h = Harness::new(8);
        let mut sink = RecordingSink::default();
        h.schedule(EventKind::NoteOn, 60, 0.005);
        h.schedule(EventKind::NoteOff, 60, 0.015);

        h.render.process(FRAMES, &mut sink);
        assert_eq!(sink.log, vec![(EventKind::NoteOn, 60, 240)]);
        assert_eq!(h.render.active_voices(), 1);

        h.render.process(FRAMES, &mut sink);
        assert_eq!(sink.log[1], (EventKind::NoteOff, 60, 240));
        assert_eq!(h.render.active_voices(), 0);
        assert_eq!(sink.rendered, 2 * FRAMES);
    }

    #[test]
    fn test_every_event_acknowledged_once() {
        let mut h = Harness::new(8);
        let mut sink = RecordingSink::default();
        let a = h.schedule(EventKind::NoteOn, 60, 0.0);
        let b = h.schedule(EventKind::NoteOn, 64, 0.001);

        h.render.process(FRAMES, &mut sink);
        let acks: Vec<PoolHandle> = h
            .drain_reports()
            .into_iter()
            .filter_map(|r| match r {
                RenderReport::Acknowledged(handle) => Some(handle),
                _ => None,
            })
            .collect();
        assert_eq!(acks, vec![a, b]);
    }

    #[test]
    fn test_acknowledgements_survive_full_report_channel() {
        let mut h = Harness::with_report_capacity(32, 2);
        let mut sink = RecordingSink::default();
        // More than the pending buffer holds: the overflow is acknowledged at once
        let handles: Vec<PoolHandle> = (0..20)
            .map(|i| h.schedule(EventKind::NoteOn, 40 + i, 0.0))
            .collect();

        let mut acks = Vec::new();
        for _ in 0..40 {
            h.render.process(FRAMES, &mut sink);
            acks.extend(h.drain_reports().into_iter().filter_map(|r| match r {
                RenderReport::Acknowledged(handle) => Some(handle),
                _ => None,
            }));
        }

        assert_eq!(acks.len(), handles.len());
        assert!(handles.iter().all(|handle| acks.contains(handle)));
    }

    #[test]
    fn test_position_confirmed_each_cycle() {
        let mut h = Harness::new(8);
        let mut sink = RecordingSink::default();
        h.render.process(FRAMES, &mut sink);

        let confirmation = h.drain_reports().into_iter().find_map(|r| match r {
            RenderReport::PositionConfirmed(c) => Some(c),
            _ => None,
        });
        let confirmation = confirmation.unwrap();
        assert_eq!(confirmation.generation, h.clock.generation());
        assert!((confirmation.rendered_until - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_stale_generation_dropped_but_acknowledged() {
        let mut h = Harness::new(8);
        let mut sink = RecordingSink::default();
        let handle = h.schedule(EventKind::NoteOn, 60, 0.0);

        // Seek before the event is rendered
        h.clock.seek(16.0, 0.0);
        h.send_snapshot();
        h.render.process(FRAMES, &mut sink);

        assert!(sink.log.is_empty());
        let reports = h.drain_reports();
        assert!(reports
            .iter()
            .any(|r| matches!(r, RenderReport::Acknowledged(acked) if *acked == handle)));
    }

    #[test]
    fn test_voice_exhaustion_skips_notes() {
        let mut h = Harness::new(2);
        let mut sink = RecordingSink::default();
        for pitch in [60, 62, 64] {
            h.schedule(EventKind::NoteOn, pitch, 0.0);
        }
        h.render.process(FRAMES, &mut sink);

        assert_eq!(sink.log.len(), 2);
        assert!(h
            .drain_reports()
            .iter()
            .any(|r| matches!(r, RenderReport::VoicesExhausted { dropped: 1 })));
    }

    #[test]
    fn test_stop_releases_all_voices() {
        let mut h = Harness::new(8);
        let mut sink = RecordingSink::default();
        h.schedule(EventKind::NoteOn, 60, 0.0);
        h.schedule(EventKind::NoteOn, 67, 0.0);
        h.render.process(FRAMES, &mut sink);
        assert_eq!(h.render.active_voices(), 2);

        h.clock.stop(0.01);
        h.send_snapshot();
        h.render.process(FRAMES, &mut sink);

        assert_eq!(h.render.active_voices(), 0);
        let offs = sink.log.iter().filter(|(k, _, _)| *k == EventKind::NoteOff).count();
        assert_eq!(offs, 2);
    }

    #[test]
    fn test_parameter_batch_applied_and_returned() {
        let mut h = Harness::new(8);
        let mut sink = RecordingSink::default();
        let batch = ParameterBatch {
            target: 7,
            values: vec![("gain".to_string(), 0.8)],
            priority: 0,
            created_at: 0.0,
        };
        let _ = h.commands.try_push(Command::Parameters(batch));
        h.render.process(FRAMES, &mut sink);

        assert_eq!(sink.batches, vec![7]);
        assert!(h
            .drain_reports()
            .iter()
            .any(|r| matches!(r, RenderReport::SpentBatch(b) if b.target == 7)));
    }

    #[test]
    fn test_shutdown() {
        let mut h = Harness::new(1);
        let mut sink = RecordingSink::default();
        assert!(h.render.process(FRAMES, &mut sink));
        let _ = h.commands.try_push(Command::Shutdown);
        assert!(!h.render.process(FRAMES, &mut sink));
        assert!(h.render.is_shutdown());
    }
}
