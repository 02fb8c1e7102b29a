// Note representation for the sequencer
// Notes and automation points are placed on the step timeline

use crate::sequencer::timeline::StepPosition;

/// Unique identifier for notes
pub type NoteId = u64;

/// Instrument that receives a note (resolved by the instrument subsystem)
pub type InstrumentId = u32;

/// Rendering-domain destination for parameters and automation
pub type TargetId = u32;

/// A musical note in the sequencer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Note {
    /// Unique identifier for this note
    pub id: NoteId,

    /// Instrument that plays the note
    pub instrument_id: InstrumentId,

    /// MIDI note number (0-127, where 60 = C4)
    pub pitch: u8,

    /// Start position on the step timeline
    pub start: StepPosition,

    /// Length in steps (ticks precision)
    pub length: StepPosition,

    /// MIDI velocity (0-127, where 127 = maximum)
    pub velocity: u8,
}

impl Note {
    /// Creates a new note
    pub fn new(
        id: NoteId,
        instrument_id: InstrumentId,
        pitch: u8,
        start: StepPosition,
        length: StepPosition,
        velocity: u8,
    ) -> Self {
        assert!(pitch <= 127, "MIDI pitch must be 0-127");
        assert!(velocity <= 127, "MIDI velocity must be 0-127");
        assert!(length.ticks() > 0, "Note length must be > 0");

        Self {
            id,
            instrument_id,
            pitch,
            start,
            length,
            velocity,
        }
    }

    /// End of the note (exclusive)
    pub fn end(&self) -> StepPosition {
        self.start + self.length
    }

    /// Check if this note sounds at a given position
    pub fn contains(&self, position: StepPosition) -> bool {
        position >= self.start && position < self.end()
    }
}

/// A single automation breakpoint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutomationPoint {
    pub position: StepPosition,
    pub target: TargetId,
    /// Parameter index on the target
    pub param: u32,
    pub value: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(n: u64) -> StepPosition {
        StepPosition::from_steps(n)
    }

    #[test]
    fn test_note_creation() {
        let note = Note::new(1, 3, 60, steps(4), steps(2), 100);

        assert_eq!(note.id, 1);
        assert_eq!(note.instrument_id, 3);
        assert_eq!(note.pitch, 60);
        assert_eq!(note.velocity, 100);
        assert_eq!(note.end(), steps(6));
    }

    #[test]
    fn test_note_contains() {
        let note = Note::new(1, 0, 60, steps(4), steps(2), 100);

        assert!(!note.contains(steps(3)));
        assert!(note.contains(steps(4)));
        assert!(note.contains(StepPosition::from_steps_f64(5.5).unwrap()));
        assert!(!note.contains(steps(6)));
    }

    #[test]
    #[should_panic(expected = "MIDI pitch must be 0-127")]
    fn test_invalid_pitch() {
        Note::new(1, 0, 128, steps(0), steps(1), 100);
    }

    #[test]
    #[should_panic(expected = "Note length must be > 0")]
    fn test_zero_length() {
        Note::new(1, 0, 60, steps(0), StepPosition::ZERO, 100);
    }
}
