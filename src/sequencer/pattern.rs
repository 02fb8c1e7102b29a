// Pattern - Musical content read by the event materializer
// Notes and automation points kept sorted by position

use crate::sequencer::note::{AutomationPoint, InstrumentId, Note, NoteId};
use crate::sequencer::timeline::StepPosition;

/// Unique identifier for patterns
pub type PatternId = u64;

/// A pattern containing notes and automation
///
/// Notes are kept sorted by start position (then id) and automation points by
/// position, so range queries are deterministic and cheap.
#[derive(Debug, Clone)]
pub struct Pattern {
    /// Unique identifier
    pub id: PatternId,

    /// Pattern name
    pub name: String,

    notes: Vec<Note>,
    automation: Vec<AutomationPoint>,
    next_note_id: NoteId,
}

impl Pattern {
    /// Create a new empty pattern
    pub fn new(id: PatternId, name: String) -> Self {
        Self {
            id,
            name,
            notes: Vec::new(),
            automation: Vec::new(),
            next_note_id: 1,
        }
    }

    /// Get all notes
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    /// Get all automation points
    pub fn automation(&self) -> &[AutomationPoint] {
        &self.automation
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty() && self.automation.is_empty()
    }

    /// Add a note to the pattern
    pub fn add_note(&mut self, note: Note) {
        let insert_pos = self
            .notes
            .binary_search_by(|n| (n.start, n.id).cmp(&(note.start, note.id)))
            .unwrap_or_else(|pos| pos);

        self.next_note_id = self.next_note_id.max(note.id + 1);
        self.notes.insert(insert_pos, note);
    }

    /// Create and add a note with a pattern-local id
    pub fn insert_note(
        &mut self,
        instrument_id: InstrumentId,
        pitch: u8,
        start: StepPosition,
        length: StepPosition,
        velocity: u8,
    ) -> NoteId {
        let id = self.next_note_id;
        self.add_note(Note::new(id, instrument_id, pitch, start, length, velocity));
        id
    }

    /// Remove a note by ID
    pub fn remove_note(&mut self, note_id: NoteId) -> Option<Note> {
        let index = self.notes.iter().position(|n| n.id == note_id)?;
        Some(self.notes.remove(index))
    }

    /// Add an automation point
    pub fn add_automation(&mut self, point: AutomationPoint) {
        let insert_pos = self
            .automation
            .partition_point(|p| p.position <= point.position);
        self.automation.insert(insert_pos, point);
    }

    /// Notes whose start lies in `[start, end)`
    pub fn notes_starting_in(
        &self,
        start: StepPosition,
        end: StepPosition,
    ) -> impl Iterator<Item = &Note> {
        let first = self.notes.partition_point(|n| n.start < start);
        self.notes[first..]
            .iter()
            .take_while(move |n| n.start < end)
    }

    /// Notes whose end lies in `[start, end)`
    pub fn notes_ending_in(
        &self,
        start: StepPosition,
        end: StepPosition,
    ) -> impl Iterator<Item = &Note> {
        self.notes
            .iter()
            .filter(move |n| n.end() >= start && n.end() < end)
    }

    /// Notes still sounding when playback reaches `boundary`
    pub fn notes_crossing(&self, boundary: StepPosition) -> impl Iterator<Item = &Note> {
        self.notes
            .iter()
            .filter(move |n| n.start < boundary && n.end() >= boundary)
    }

    /// Automation points in `[start, end)`
    pub fn automation_in(
        &self,
        start: StepPosition,
        end: StepPosition,
    ) -> impl Iterator<Item = &AutomationPoint> {
        let first = self.automation.partition_point(|p| p.position < start);
        self.automation[first..]
            .iter()
            .take_while(move |p| p.position < end)
    }

    /// Note starts per step over `[from, from + span)`
    pub fn event_density(&self, from: StepPosition, span: StepPosition) -> f64 {
        let span_steps = span.as_steps_f64();
        if span_steps <= 0.0 {
            return 0.0;
        }
        let count = self.notes_starting_in(from, from + span).count()
            + self.automation_in(from, from + span).count();
        count as f64 / span_steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(n: u64) -> StepPosition {
        StepPosition::from_steps(n)
    }

    #[test]
    fn test_pattern_creation() {
        let pattern = Pattern::new(1, "Test Pattern".to_string());
        assert_eq!(pattern.id, 1);
        assert_eq!(pattern.name, "Test Pattern");
        assert!(pattern.is_empty());
    }

    #[test]
    fn test_notes_sorted() {
        let mut pattern = Pattern::new(1, "Test".to_string());
        pattern.insert_note(0, 64, steps(8), steps(1), 100);
        pattern.insert_note(0, 60, steps(0), steps(1), 100);
        pattern.insert_note(0, 62, steps(4), steps(1), 100);

        let starts: Vec<u64> = pattern.notes().iter().map(|n| n.start.step_index()).collect();
        assert_eq!(starts, vec![0, 4, 8]);
    }

    #[test]
    fn test_insert_note_ids_unique() {
        let mut pattern = Pattern::new(1, "Test".to_string());
        pattern.add_note(Note::new(10, 0, 60, steps(0), steps(1), 100));
        let id = pattern.insert_note(0, 61, steps(1), steps(1), 100);
        assert_eq!(id, 11);
    }

    #[test]
    fn test_remove_note() {
        let mut pattern = Pattern::new(1, "Test".to_string());
        let id = pattern.insert_note(0, 60, steps(0), steps(1), 100);

        assert!(pattern.remove_note(id).is_some());
        assert!(pattern.remove_note(id).is_none());
        assert!(pattern.is_empty());
    }

    #[test]
    fn test_range_queries() {
        let mut pattern = Pattern::new(1, "Test".to_string());
        pattern.insert_note(0, 60, steps(0), steps(2), 100);
        pattern.insert_note(0, 62, steps(2), steps(6), 100);
        pattern.insert_note(0, 64, steps(4), steps(1), 100);

        assert_eq!(pattern.notes_starting_in(steps(0), steps(4)).count(), 2);
        assert_eq!(pattern.notes_starting_in(steps(4), steps(5)).count(), 1);
        assert_eq!(pattern.notes_ending_in(steps(2), steps(6)).count(), 2);
        assert_eq!(pattern.notes_crossing(steps(4)).count(), 1);
    }

    #[test]
    fn test_automation_in() {
        let mut pattern = Pattern::new(1, "Test".to_string());
        for (step, value) in [(3, 0.3), (1, 0.1), (2, 0.2)] {
            pattern.add_automation(AutomationPoint {
                position: steps(step),
                target: 7,
                param: 0,
                value,
            });
        }

        let values: Vec<f32> = pattern
            .automation_in(steps(1), steps(3))
            .map(|p| p.value)
            .collect();
        assert_eq!(values, vec![0.1, 0.2]);
    }

    #[test]
    fn test_event_density() {
        let mut pattern = Pattern::new(1, "Test".to_string());
        for step in 0..8 {
            pattern.insert_note(0, 60, steps(step * 2), steps(1), 100);
        }
        assert_eq!(pattern.event_density(steps(0), steps(16)), 0.5);
        assert_eq!(pattern.event_density(steps(0), StepPosition::ZERO), 0.0);
    }
}
