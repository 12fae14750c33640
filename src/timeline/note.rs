// Notes derived from frame-level pitch detections
// A note is a pitch held over consecutive time steps of one section

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Index of a note in its section's note list
pub type NoteIndex = usize;

/// A detected note
///
/// `start_frame` is relative to the owning section. The note is open while its
/// pitch stays active in the section's latest frame; once closed it is never
/// mutated again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// MIDI note number
    pub pitch: u8,
    /// First time step (section-relative)
    pub start_frame: usize,
    /// Number of consecutive time steps
    pub duration: usize,
}

impl Note {
    /// A note that starts at `start_frame` and lasts one frame
    pub fn new(pitch: u8, start_frame: usize) -> Self {
        Self {
            pitch,
            start_frame,
            duration: 1,
        }
    }

    /// One past the last time step of the note
    pub fn end_frame(&self) -> usize {
        self.start_frame + self.duration
    }

    pub fn contains_frame(&self, frame: usize) -> bool {
        frame >= self.start_frame && frame < self.end_frame()
    }

    /// Get the note name (e.g., "E2", "A#3")
    pub fn note_name(&self) -> String {
        const NOTE_NAMES: [&str; 12] = [
            "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
        ];

        let octave = (self.pitch / 12) as i32 - 1;
        format!("{}{}", NOTE_NAMES[(self.pitch % 12) as usize], octave)
    }
}

/// Notes touched by one tracked frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackedFrame {
    /// Notes active in the frame, ascending by pitch
    pub active: Vec<NoteIndex>,
    /// Pitches whose note opened in this frame, ascending
    pub onsets: Vec<u8>,
}

/// Aggregates per-frame pitch sets into notes
///
/// Holds the notes still open after the last tracked frame, keyed by pitch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NoteTracker {
    open: HashMap<u8, NoteIndex>,
    next_frame: usize,
}

impl NoteTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track frame `frame` whose active pitches are `pitches`
    ///
    /// Open notes whose pitch is still active are extended by one frame, every
    /// other active pitch opens a new note appended to `notes`. Open notes of
    /// pitches no longer active are closed. A frame that does not directly
    /// follow the last tracked one has no predecessor.
    pub fn track(&mut self, frame: usize, pitches: &[u8], notes: &mut Vec<Note>) -> TrackedFrame {
        let mut pitches = pitches.to_vec();
        pitches.sort_unstable();
        pitches.dedup();

        let mut previous = if frame == self.next_frame {
            std::mem::take(&mut self.open)
        } else {
            HashMap::new()
        };
        self.open.clear();

        let mut tracked = TrackedFrame::default();
        for pitch in pitches {
            let index = match previous.remove(&pitch) {
                Some(index) => {
                    notes[index].duration += 1;
                    index
                }
                None => {
                    notes.push(Note::new(pitch, frame));
                    tracked.onsets.push(pitch);
                    notes.len() - 1
                }
            };
            self.open.insert(pitch, index);
            tracked.active.push(index);
        }

        self.next_frame = frame + 1;
        tracked
    }

    /// Whether the note at `index` is still open
    pub fn is_open(&self, index: NoteIndex) -> bool {
        self.open.values().any(|open| *open == index)
    }

    /// Indices of the open notes, ascending by pitch
    pub fn open_notes(&self) -> Vec<NoteIndex> {
        let mut open: Vec<(u8, NoteIndex)> = self.open.iter().map(|(p, i)| (*p, *i)).collect();
        open.sort_unstable();
        open.into_iter().map(|(_, index)| index).collect()
    }

    /// Re-derive notes from a sequence of per-frame pitch sets
    ///
    /// Returns the tracker positioned after the last frame, the notes, and the
    /// active note indices of every frame.
    pub fn rebuild(frames: &[Vec<u8>]) -> (Self, Vec<Note>, Vec<Vec<NoteIndex>>) {
        let mut tracker = Self::new();
        let mut notes = Vec::new();
        let active = frames
            .iter()
            .enumerate()
            .map(|(frame, pitches)| tracker.track(frame, pitches, &mut notes).active)
            .collect();
        (tracker, notes, active)
    }
}
