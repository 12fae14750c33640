// Types for recording persistence

use crate::analysis::config::AnalysisConfig;
use crate::timeline::section::NoteCluster;
use crate::timeline::tuning::Tuning;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Recording format version information
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormatVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl FormatVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn current() -> Self {
        Self::new(1, 0, 0)
    }
}

impl std::fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Small projection of a recording, readable without loading its audio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingMetaData {
    /// Version of the recording format
    pub version: FormatVersion,
    pub id: Uuid,
    pub name: String,
    /// Total length in samples
    pub length: u64,
    pub sample_rate: u32,
    pub created_at: DateTime<Utc>,
    pub last_edited_at: DateTime<Utc>,
}

impl RecordingMetaData {
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.length as f64 / self.sample_rate as f64
        }
    }
}

/// Full recording body, minus sample data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingFile {
    pub version: FormatVersion,
    pub id: Uuid,
    pub name: String,
    pub tuning: Tuning,
    pub config: AnalysisConfig,
    pub created_at: DateTime<Utc>,
    pub last_edited_at: DateTime<Utc>,
    pub sections: Vec<SectionRecord>,
}

/// Stored section; its samples live in a separate archive entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionRecord {
    pub id: u64,
    pub sample_start: usize,
    pub time_step_start: usize,
    pub cluster_start: usize,
    /// Number of samples in the section's audio entry
    pub sample_count: usize,
    pub is_gathered: bool,
    pub time_steps: Vec<TimeStepRecord>,
    pub note_clusters: Vec<NoteCluster>,
}

/// Stored time step; notes are re-derived from `pitches` on load
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeStepRecord {
    pub frame_index: usize,
    pub predictions: Vec<f32>,
    pub spectrum: Vec<f32>,
    pub reconstruction: Vec<f32>,
    pub power: f32,
    pub pitches: Vec<u8>,
}
