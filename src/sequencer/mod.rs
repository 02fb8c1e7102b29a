// Sequencer module
// Musical position, pattern content and the transport clock

pub mod note;
pub mod pattern;
pub mod timeline;
pub mod transport;

pub use note::{AutomationPoint, InstrumentId, Note, NoteId, TargetId};
pub use pattern::{Pattern, PatternId};
pub use timeline::{LoopRegion, StepPosition, Tempo, TICKS_PER_STEP};
pub use transport::{
    PositionChange, PositionClock, PositionConfirmation, TransportError, TransportSnapshot,
    TransportState,
};
