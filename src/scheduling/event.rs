// Scheduled events - Timed output of the materializer

use crate::audio::pool::Poolable;
use crate::sequencer::note::{InstrumentId, TargetId};
use crate::sequencer::timeline::StepPosition;
use std::cmp::Ordering;

/// Kind of scheduled event
///
/// Declaration order is the tie-break order for events on the same tick:
/// note-offs go out before a re-triggered note-on at the same instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum EventKind {
    #[default]
    NoteOff,
    Automation,
    LoopBoundary,
    NoteOn,
}

/// Note data handed to the instrument subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotePayload {
    pub instrument_id: InstrumentId,
    pub pitch: u8,
    pub velocity: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum EventPayload {
    #[default]
    None,
    Note(NotePayload),
    Automation {
        target: TargetId,
        param: u32,
        value: f32,
    },
    LoopBoundary {
        loop_start: StepPosition,
        loop_end: StepPosition,
    },
}

/// An event placed on the rendering clock
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScheduledEvent {
    /// Rendering clock time in seconds
    pub time_seconds: f64,
    pub kind: EventKind,
    pub payload: EventPayload,
    /// Monotonic counter, breaks ties on equal `time_seconds`
    pub sequence_id: u64,
    /// Transport generation the event was materialized for
    pub generation: u64,
    /// Musical position the event was derived from (wrapped)
    pub position: StepPosition,
    pub executed: bool,
    pub cancelled: bool,
}

impl ScheduledEvent {
    /// Total order used by the queue: time, then sequence id
    pub fn schedule_order(&self, other: &ScheduledEvent) -> Ordering {
        self.time_seconds
            .total_cmp(&other.time_seconds)
            .then(self.sequence_id.cmp(&other.sequence_id))
    }

    pub fn is_pending(&self) -> bool {
        !self.executed && !self.cancelled
    }

    pub fn note(&self) -> Option<NotePayload> {
        match self.payload {
            EventPayload::Note(note) => Some(note),
            _ => None,
        }
    }
}

impl Poolable for ScheduledEvent {
    fn reset(&mut self) {
        *self = Self::default();
    }
}
