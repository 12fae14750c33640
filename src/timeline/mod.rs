// Timeline module
// Sections of analysed audio, the notes derived from them, and the
// recording that orders them

pub mod note;
pub mod recording;
pub mod section;
pub mod tuning;

pub use note::{Note, NoteIndex, NoteTracker};
pub use recording::{CutOutcome, PlacedCluster, PlacedNote, Recording, TimelineError};
pub use section::{NoteCluster, Section, SectionId, TimeStep};
pub use tuning::Tuning;
