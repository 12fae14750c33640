// Recording persistence
// Zip container with a separately readable metadata record

pub mod manager;
pub mod serialization;
pub mod types;

pub use manager::{
    CatalogEntry, PersistenceError, RECORDING_EXTENSION, RecordingManager, list_catalog,
    load_metadata, load_recording, save_recording,
};
pub use serialization::{deserialize, read_metadata, serialize};
pub use types::{FormatVersion, RecordingMetaData, RecordingFile, SectionRecord, TimeStepRecord};

use crate::timeline::recording::Recording;

/// Check a recording is fit to be written
///
/// Rejects blank or oversized names and broken offsets.
pub fn validate_recording_structure(recording: &Recording) -> Result<(), PersistenceError> {
    if recording.name.trim().is_empty() {
        return Err(PersistenceError::Corrupt(
            "Recording name cannot be empty".to_string(),
        ));
    }

    if recording.name.len() > 255 {
        return Err(PersistenceError::Corrupt(
            "Recording name cannot exceed 255 characters".to_string(),
        ));
    }

    recording.check_offsets()?;
    Ok(())
}
