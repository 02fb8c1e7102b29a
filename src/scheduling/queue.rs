// Event Queue - Materializes musical content into timed events
//
// Events live in a fixed-capacity pool; `order` holds the handles of events
// that have not been handed out yet, sorted by (time, sequence id).

use super::ScheduleError;
use super::event::{EventKind, EventPayload, NotePayload, ScheduledEvent};
use crate::audio::pool::{ObjectPool, PoolHandle};
use crate::sequencer::pattern::Pattern;
use crate::sequencer::timeline::StepPosition;
use crate::sequencer::transport::TransportSnapshot;

/// An event handed to the consumer, with the handle to acknowledge
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadyEvent {
    pub handle: PoolHandle,
    pub event: ScheduledEvent,
}

/// How far materialization has progressed for one transport generation
#[derive(Debug, Clone, Copy, PartialEq)]
struct Cursor {
    generation: u64,
    /// Unwrapped tick line, exclusive
    ticks: u64,
    /// Content position matching `ticks`; may sit exactly on the loop end
    /// when the boundary events are still owed
    content: StepPosition,
}

/// A content point found while walking one segment
#[derive(Debug, Clone, Copy)]
struct Point {
    ticks: u64,
    kind: EventKind,
    tie: u64,
    position: StepPosition,
    payload: EventPayload,
}

#[derive(Debug)]
pub struct EventQueue {
    pool: ObjectPool<ScheduledEvent>,
    order: Vec<PoolHandle>,
    next_sequence_id: u64,
    cursor: Option<Cursor>,
    scratch: Vec<Point>,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            pool: ObjectPool::with_default("events", capacity),
            order: Vec::with_capacity(capacity),
            next_sequence_id: 0,
            cursor: None,
            scratch: Vec::with_capacity(64),
        }
    }

    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    /// Events not yet handed out (cancelled ones included until reclaimed)
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Events handed out and waiting for acknowledgement
    pub fn in_flight(&self) -> usize {
        self.pool.active_count() - self.order.len()
    }

    /// Unwrapped position up to which events exist
    pub fn materialized_until(&self) -> Option<StepPosition> {
        self.cursor.map(|c| StepPosition::from_ticks(c.ticks))
    }

    /// Pending (not cancelled) events in schedule order
    pub fn iter_pending(&self) -> impl Iterator<Item = &ScheduledEvent> {
        self.order
            .iter()
            .filter_map(|handle| self.pool.get(*handle))
            .filter(|event| event.is_pending())
    }

    /// Forget how far materialization went; the next call restarts at the
    /// snapshot's anchor
    pub fn rearm(&mut self) {
        self.cursor = None;
    }

    /// Produce every event between the last materialized point and
    /// `horizon_time`
    ///
    /// Calling again with the same horizon and transport state does nothing.
    /// When the pool runs out, the rest of the span is still walked but the
    /// events that did not fit are dropped and reported.
    pub fn materialize_up_to(
        &mut self,
        horizon_time: f64,
        clock: &TransportSnapshot,
        content: &Pattern,
    ) -> Result<usize, ScheduleError> {
        if !clock.is_playing() {
            return Ok(0);
        }

        let mut cursor = match self.cursor {
            Some(cursor) if cursor.generation == clock.generation() => cursor,
            _ => {
                let anchor = clock.anchor();
                Cursor {
                    generation: clock.generation(),
                    ticks: anchor.ticks(),
                    content: clock.wrap(anchor),
                }
            }
        };

        let target = clock.ticks_at(horizon_time);
        if target <= cursor.ticks {
            self.cursor = Some(cursor);
            return Ok(0);
        }

        let mut materialized = 0;
        let mut dropped = 0;

        while cursor.ticks < target {
            if let Some(region) = clock.loop_region() {
                if cursor.content >= region.end() {
                    if cursor.content == region.end() {
                        self.collect_boundary(cursor.ticks, region.start(), region.end(), content);
                        self.flush_scratch(clock, &mut materialized, &mut dropped);
                    }
                    cursor.content = region.wrap(cursor.content);
                    continue;
                }
            }

            let remaining = target - cursor.ticks;
            let span = match clock.loop_region() {
                Some(region) => remaining.min(region.end().ticks() - cursor.content.ticks()),
                None => remaining,
            };
            let start = cursor.content;
            let end = start + StepPosition::from_ticks(span);

            self.collect_segment(cursor.ticks, start, end, content);
            self.flush_scratch(clock, &mut materialized, &mut dropped);

            cursor.ticks += span;
            cursor.content = end;
        }

        self.cursor = Some(cursor);

        if dropped > 0 {
            return Err(ScheduleError::PoolExhausted {
                dropped,
                materialized,
                capacity: self.pool.capacity(),
            });
        }
        Ok(materialized)
    }

    /// Points for content `[start, end)` beginning at unwrapped tick `base`
    fn collect_segment(
        &mut self,
        base: u64,
        start: StepPosition,
        end: StepPosition,
        content: &Pattern,
    ) {
        let at = |position: StepPosition| base + (position.ticks() - start.ticks());

        // Notes running into the loop end are closed by the boundary instead
        for note in content.notes_ending_in(start, end) {
            self.scratch.push(Point {
                ticks: at(note.end()),
                kind: EventKind::NoteOff,
                tie: note.id,
                position: note.end(),
                payload: EventPayload::Note(NotePayload {
                    instrument_id: note.instrument_id,
                    pitch: note.pitch,
                    velocity: 0,
                }),
            });
        }

        for point in content.automation_in(start, end) {
            self.scratch.push(Point {
                ticks: at(point.position),
                kind: EventKind::Automation,
                tie: u64::from(point.param),
                position: point.position,
                payload: EventPayload::Automation {
                    target: point.target,
                    param: point.param,
                    value: point.value,
                },
            });
        }

        for note in content.notes_starting_in(start, end) {
            self.scratch.push(Point {
                ticks: at(note.start),
                kind: EventKind::NoteOn,
                tie: note.id,
                position: note.start,
                payload: EventPayload::Note(NotePayload {
                    instrument_id: note.instrument_id,
                    pitch: note.pitch,
                    velocity: note.velocity,
                }),
            });
        }
    }

    /// Note-offs for notes still sounding at the loop end, then the
    /// boundary marker itself
    fn collect_boundary(
        &mut self,
        ticks: u64,
        loop_start: StepPosition,
        loop_end: StepPosition,
        content: &Pattern,
    ) {
        for note in content.notes_crossing(loop_end) {
            self.scratch.push(Point {
                ticks,
                kind: EventKind::NoteOff,
                tie: note.id,
                position: loop_end,
                payload: EventPayload::Note(NotePayload {
                    instrument_id: note.instrument_id,
                    pitch: note.pitch,
                    velocity: 0,
                }),
            });
        }
        self.scratch.push(Point {
            ticks,
            kind: EventKind::LoopBoundary,
            tie: 0,
            position: loop_end,
            payload: EventPayload::LoopBoundary {
                loop_start,
                loop_end,
            },
        });
    }

    /// Sort collected points and move them into the pool
    fn flush_scratch(
        &mut self,
        clock: &TransportSnapshot,
        materialized: &mut usize,
        dropped: &mut usize,
    ) {
        self.scratch
            .sort_by_key(|point| (point.ticks, point.kind, point.tie));

        for point in self.scratch.drain(..) {
            let handle = match self.pool.acquire() {
                Ok(handle) => handle,
                Err(_) => {
                    *dropped += 1;
                    continue;
                }
            };
            let event = ScheduledEvent {
                time_seconds: clock.time_of(point.ticks),
                kind: point.kind,
                payload: point.payload,
                sequence_id: self.next_sequence_id,
                generation: clock.generation(),
                position: point.position,
                executed: false,
                cancelled: false,
            };
            self.next_sequence_id += 1;

            if let Some(slot) = self.pool.get_mut(handle) {
                *slot = event;
            }
            let pool = &self.pool;
            let index = self.order.partition_point(|h| {
                pool.get(*h)
                    .is_some_and(|e| e.schedule_order(&event).is_lt())
            });
            self.order.insert(index, handle);
            *materialized += 1;
        }
    }

    /// Mark every pending event at or after `time` as cancelled
    ///
    /// Slots are reclaimed lazily by `pop_ready` or `reclaim_cancelled`.
    pub fn cancel_from(&mut self, time: f64) -> usize {
        let mut cancelled = 0;
        for handle in &self.order {
            if let Some(event) = self.pool.get_mut(*handle) {
                if event.is_pending() && event.time_seconds >= time {
                    event.cancelled = true;
                    cancelled += 1;
                }
            }
        }
        cancelled
    }

    pub fn cancel_all(&mut self) -> usize {
        self.cancel_from(f64::NEG_INFINITY)
    }

    /// Hand out every event due at `now`
    ///
    /// Pushes non-cancelled events with `time_seconds <= now` into `out`
    /// (marking them executed) and releases cancelled ones passed over.
    /// Returns the number of events pushed.
    pub fn pop_ready(&mut self, now: f64, out: &mut Vec<ReadyEvent>) -> usize {
        let pool = &self.pool;
        let due = self
            .order
            .partition_point(|h| pool.get(*h).is_some_and(|e| e.time_seconds <= now));

        let mut popped = 0;
        for handle in self.order.drain(..due) {
            let Some(event) = self.pool.get_mut(handle) else {
                continue;
            };
            if event.cancelled {
                let _ = self.pool.release(handle);
                continue;
            }
            event.executed = true;
            out.push(ReadyEvent {
                handle,
                event: *event,
            });
            popped += 1;
        }
        popped
    }

    /// Release an executed event's slot
    pub fn acknowledge(&mut self, handle: PoolHandle) -> Result<(), ScheduleError> {
        if self.pool.get(handle).is_some_and(|event| !event.executed) {
            return Err(ScheduleError::NotExecuted(handle));
        }
        self.pool.release(handle)?;
        Ok(())
    }

    /// Release every cancelled event still waiting in the queue
    pub fn reclaim_cancelled(&mut self) -> usize {
        let pool = &mut self.pool;
        let before = self.order.len();
        self.order.retain(|handle| {
            if pool.get(*handle).is_some_and(|e| e.cancelled) {
                let _ = pool.release(*handle);
                false
            } else {
                true
            }
        });
        before - self.order.len()
    }

    /// Drop everything, including events awaiting acknowledgement
    pub fn clear(&mut self) {
        self.pool.release_all();
        self.order.clear();
        self.cursor = None;
    }
}
