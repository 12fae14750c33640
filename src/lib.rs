// fretscribe - Library exports for the binary, tests and benchmarks

pub mod analysis;
pub mod audio;
pub mod capture;
pub mod persistence;
pub mod timeline;

// Re-export commonly used types for convenience
pub use analysis::{
    AnalysisConfig, EngineError, InferenceEngine, InferenceOutput, PitchFrame, PitchModel,
    SpectralModel,
};
pub use capture::{CaptureError, Recorder, SharedRecording, create_sample_channel};
pub use persistence::{
    CatalogEntry, PersistenceError, RecordingManager, RecordingMetaData, list_catalog,
    load_recording, save_recording,
};
pub use timeline::{
    CutOutcome, Note, NoteCluster, NoteTracker, Recording, Section, SectionId, TimeStep,
    TimelineError, Tuning,
};
