// Scheduling module - Turns transport position into timed events

pub mod clock;
pub mod event;
pub mod lookahead;
pub mod queue;

use crate::audio::pool::{PoolError, PoolHandle};
use thiserror::Error;

pub use clock::{ClockSource, FrameTicker, ManualClock, SystemClock, Tick};
pub use event::{EventKind, EventPayload, NotePayload, ScheduledEvent};
pub use lookahead::{LookaheadLimits, LookaheadScheduler, LookaheadState};
pub use queue::{EventQueue, ReadyEvent};

/// Scheduling errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScheduleError {
    /// Backpressure: the event pool ran out during materialization
    #[error("Event pool exhausted (capacity {capacity}): {dropped} event(s) dropped, {materialized} scheduled")]
    PoolExhausted {
        dropped: usize,
        materialized: usize,
        capacity: usize,
    },

    #[error("Event {0:?} acknowledged before it was handed out")]
    NotExecuted(PoolHandle),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
