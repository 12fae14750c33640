// Recording manager for loading, saving and listing recordings

use crate::analysis::config::AnalysisConfig;
use crate::persistence::serialization::*;
use crate::persistence::types::*;
use crate::timeline::recording::{Recording, TimelineError};
use crate::timeline::tuning::Tuning;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;
use walkdir::WalkDir;

/// File extension of recording containers
pub const RECORDING_EXTENSION: &str = "fretrec";

/// Persistence error types
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RON error: {0}")]
    Ron(#[from] ron::Error),

    #[error("RON parse error: {0}")]
    RonParse(#[from] ron::error::SpannedError),

    #[error("Recording format {found} is not supported (expected {expected})")]
    VersionMismatch {
        found: FormatVersion,
        expected: FormatVersion,
    },

    #[error("Corrupt recording: {0}")]
    Corrupt(String),

    #[error("Missing archive entry: {0}")]
    MissingEntry(String),

    #[error("Timeline error: {0}")]
    Timeline(#[from] TimelineError),
}

/// Save a recording container to `path`
pub fn save_recording<P: AsRef<Path>>(
    recording: &Recording,
    path: P,
) -> Result<(), PersistenceError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(path)?;
    let mut writer = serialize(recording, BufWriter::new(file))?;
    writer.flush()?;

    log::info!(
        "Saved recording '{}' ({} sections) to {}",
        recording.name,
        recording.section_count(),
        path.display()
    );
    Ok(())
}

/// Load a recording container from `path`
pub fn load_recording<P: AsRef<Path>>(path: P) -> Result<Recording, PersistenceError> {
    let path = path.as_ref();
    let recording = deserialize(BufReader::new(File::open(path)?))?;
    log::info!(
        "Loaded recording '{}' ({} sections) from {}",
        recording.name,
        recording.section_count(),
        path.display()
    );
    Ok(recording)
}

/// Read only the metadata record of the container at `path`
pub fn load_metadata<P: AsRef<Path>>(path: P) -> Result<RecordingMetaData, PersistenceError> {
    read_metadata(BufReader::new(File::open(path)?))
}

/// One recording found by a catalog listing
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub path: PathBuf,
    pub metadata: RecordingMetaData,
}

/// List the recordings stored directly in `directory`
///
/// Only metadata records are read. Files that fail to decode are skipped.
pub fn list_catalog<P: AsRef<Path>>(directory: P) -> Result<Vec<CatalogEntry>, PersistenceError> {
    let mut entries = Vec::new();

    for entry in WalkDir::new(directory.as_ref()).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            PersistenceError::Io(std::io::Error::other(format!("Directory walk error: {}", e)))
        })?;
        let path = entry.path();
        if !entry.file_type().is_file()
            || path.extension().and_then(|e| e.to_str()) != Some(RECORDING_EXTENSION)
        {
            continue;
        }

        match load_metadata(path) {
            Ok(metadata) => entries.push(CatalogEntry {
                path: path.to_path_buf(),
                metadata,
            }),
            Err(e) => log::warn!("Skipping {}: {}", path.display(), e),
        }
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

/// Recording manager - keeps recordings in one directory
pub struct RecordingManager {
    directory: PathBuf,
    config: AnalysisConfig,
}

impl RecordingManager {
    pub fn new<P: Into<PathBuf>>(directory: P, config: AnalysisConfig) -> Self {
        Self {
            directory: directory.into(),
            config,
        }
    }

    /// Platform recordings directory
    pub fn default_directory() -> PathBuf {
        dirs::audio_dir()
            .or_else(dirs::data_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fretscribe")
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Create an empty recording using the manager's analysis configuration
    pub fn create_recording(&self, name: impl Into<String>, tuning: Tuning) -> Recording {
        Recording::new(name, tuning, self.config.clone())
    }

    /// Where `recording` is stored in this manager's directory
    pub fn path_for(&self, recording: &Recording) -> PathBuf {
        self.path_for_id(recording.id())
    }

    pub fn path_for_id(&self, id: Uuid) -> PathBuf {
        self.directory.join(format!("{}.{}", id, RECORDING_EXTENSION))
    }

    pub fn save(&self, recording: &Recording) -> Result<PathBuf, PersistenceError> {
        let path = self.path_for(recording);
        save_recording(recording, &path)?;
        Ok(path)
    }

    pub fn load(&self, id: Uuid) -> Result<Recording, PersistenceError> {
        load_recording(self.path_for_id(id))
    }

    pub fn catalog(&self) -> Result<Vec<CatalogEntry>, PersistenceError> {
        if !self.directory.exists() {
            return Ok(Vec::new());
        }
        list_catalog(&self.directory)
    }

    /// Delete a stored recording; returns whether a file was removed
    pub fn delete(&self, id: Uuid) -> Result<bool, PersistenceError> {
        let path = self.path_for_id(id);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                log::info!("Deleted {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_manager_save_load_cycle() {
        let dir = tempdir().unwrap();
        let manager = RecordingManager::new(dir.path().join("recordings"), AnalysisConfig::default());

        let mut recording = manager.create_recording("Empty Take", Tuning::standard_guitar());
        recording.start_section().unwrap();
        recording.push_samples(&[0.25; 100]).unwrap();
        recording.end_section();

        let path = manager.save(&recording).unwrap();
        assert!(path.exists());
        assert_eq!(path.extension().unwrap(), RECORDING_EXTENSION);

        let loaded = manager.load(recording.id()).unwrap();
        assert_eq!(loaded, recording);
        assert_eq!(loaded.total_samples(), 100);
    }

    #[test]
    fn test_catalog_and_delete() {
        let dir = tempdir().unwrap();
        let manager = RecordingManager::new(dir.path(), AnalysisConfig::default());
        assert!(manager.catalog().unwrap().is_empty());

        let first = manager.create_recording("First", Tuning::default());
        let second = manager.create_recording("Second", Tuning::default());
        manager.save(&first).unwrap();
        manager.save(&second).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a recording").unwrap();

        let catalog = manager.catalog().unwrap();
        assert_eq!(catalog.len(), 2);
        assert!(catalog.windows(2).all(|w| w[0].path <= w[1].path));

        assert!(manager.delete(first.id()).unwrap());
        assert!(!manager.delete(first.id()).unwrap());
        let catalog = manager.catalog().unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].metadata.name, "Second");
    }

    #[test]
    fn test_missing_directory_catalog_is_empty() {
        let dir = tempdir().unwrap();
        let manager = RecordingManager::new(dir.path().join("absent"), AnalysisConfig::default());
        assert!(manager.catalog().unwrap().is_empty());
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.fretrec");
        std::fs::write(&path, b"PK not really a zip").unwrap();
        assert!(load_recording(&path).is_err());
        assert!(load_metadata(&path).is_err());
    }
}
