// Serialization utilities for recording persistence
//
// Container layout (zip, deflated), in write order:
//   metadata.json              RecordingMetaData
//   recording.ron              RecordingFile
//   audio/section_NNNN.f32     samples of section NNNN as little-endian f32
//
// The metadata entry comes first and decodes on its own, so listing a
// catalog never touches the body or the audio.

use crate::persistence::manager::PersistenceError;
use crate::persistence::types::*;
use crate::timeline::recording::Recording;
use crate::timeline::section::{Section, SectionId, TimeStep};
use std::collections::HashSet;
use std::io::{Read, Seek, Write};
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const METADATA_ENTRY: &str = "metadata.json";
pub const BODY_ENTRY: &str = "recording.ron";

/// Archive entry holding the samples of the section at `index`
pub fn audio_entry(index: usize) -> String {
    format!("audio/section_{:04}.f32", index)
}

fn entry_options() -> FileOptions<()> {
    FileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// Metadata projection of a recording
pub fn metadata_of(recording: &Recording) -> RecordingMetaData {
    RecordingMetaData {
        version: FormatVersion::current(),
        id: recording.id(),
        name: recording.name.clone(),
        length: recording.total_samples() as u64,
        sample_rate: recording.config().sample_rate,
        created_at: recording.created_at(),
        last_edited_at: recording.last_edited_at(),
    }
}

/// Convert a recording to its stored body (samples excluded)
pub fn recording_to_file(recording: &Recording) -> RecordingFile {
    RecordingFile {
        version: FormatVersion::current(),
        id: recording.id(),
        name: recording.name.clone(),
        tuning: recording.tuning.clone(),
        config: recording.config().clone(),
        created_at: recording.created_at(),
        last_edited_at: recording.last_edited_at(),
        sections: recording.sections().iter().map(section_to_record).collect(),
    }
}

fn section_to_record(section: &Section) -> SectionRecord {
    let pitch_sets = section.pitch_sets();
    SectionRecord {
        id: section.id().0,
        sample_start: section.sample_start(),
        time_step_start: section.time_step_start(),
        cluster_start: section.cluster_start(),
        sample_count: section.samples().len(),
        is_gathered: section.is_gathered(),
        time_steps: section
            .time_steps()
            .iter()
            .zip(pitch_sets)
            .map(|(step, pitches)| TimeStepRecord {
                frame_index: step.frame_index,
                predictions: step.predictions.clone(),
                spectrum: step.spectrum.clone(),
                reconstruction: step.reconstruction.clone(),
                power: step.power,
                pitches,
            })
            .collect(),
        note_clusters: section.note_clusters().to_vec(),
    }
}

/// Rebuild a recording from its stored body and per-section samples
pub fn recording_from_file(
    file: RecordingFile,
    audio: Vec<Vec<f32>>,
) -> Result<Recording, PersistenceError> {
    check_version(file.version)?;
    file.config
        .validate()
        .map_err(|e| PersistenceError::Corrupt(e.to_string()))?;

    if audio.len() != file.sections.len() {
        return Err(PersistenceError::Corrupt(format!(
            "{} sections but {} audio entries",
            file.sections.len(),
            audio.len()
        )));
    }

    let mut ids = HashSet::new();
    let mut stored_offsets = Vec::with_capacity(file.sections.len());
    let mut sections = Vec::with_capacity(file.sections.len());

    for (index, (record, samples)) in file.sections.into_iter().zip(audio).enumerate() {
        if !ids.insert(record.id) {
            return Err(PersistenceError::Corrupt(format!(
                "duplicate section id {}",
                record.id
            )));
        }
        if record.sample_count != samples.len() {
            return Err(PersistenceError::Corrupt(format!(
                "section {} declares {} samples, audio entry holds {}",
                index,
                record.sample_count,
                samples.len()
            )));
        }

        let steps = record.time_steps.len();
        if let Some(cluster) = record.note_clusters.iter().find(|c| c.start >= steps) {
            return Err(PersistenceError::Corrupt(format!(
                "section {} cluster starts at {} past its {} time steps",
                index, cluster.start, steps
            )));
        }

        let mut time_steps = Vec::with_capacity(steps);
        let mut pitch_sets = Vec::with_capacity(steps);
        for (position, step) in record.time_steps.into_iter().enumerate() {
            if step.frame_index != position {
                return Err(PersistenceError::Corrupt(format!(
                    "section {} time step {} has frame index {}",
                    index, position, step.frame_index
                )));
            }
            if let Some(pitch) = step.pitches.iter().find(|p| {
                **p < file.config.base_pitch || (**p as usize) >= file.config.pitch_end()
            }) {
                return Err(PersistenceError::Corrupt(format!(
                    "section {} time step {} has pitch {} outside the analysis range",
                    index, position, pitch
                )));
            }
            pitch_sets.push(step.pitches);
            time_steps.push(TimeStep {
                frame_index: step.frame_index,
                predictions: step.predictions,
                spectrum: step.spectrum,
                reconstruction: step.reconstruction,
                power: step.power,
                notes: Vec::new(),
            });
        }

        stored_offsets.push((
            record.sample_start,
            record.time_step_start,
            record.cluster_start,
        ));
        sections.push(Section::from_parts(
            SectionId(record.id),
            samples,
            time_steps,
            &pitch_sets,
            record.note_clusters,
            record.is_gathered,
        ));
    }

    if let Some(active) = sections.iter().position(|s| !s.is_gathered())
        && active + 1 != sections.len()
    {
        return Err(PersistenceError::Corrupt(format!(
            "section {} is still gathering but is not the last section",
            active
        )));
    }

    let recording = Recording::from_parts(
        file.id,
        file.name,
        file.tuning,
        file.config,
        file.created_at,
        file.last_edited_at,
        sections,
    );

    for (index, (section, stored)) in recording.sections().iter().zip(stored_offsets).enumerate() {
        let actual = (
            section.sample_start(),
            section.time_step_start(),
            section.cluster_start(),
        );
        if actual != stored {
            return Err(PersistenceError::Corrupt(format!(
                "section {} stored offsets {:?} do not match {:?}",
                index, stored, actual
            )));
        }
    }

    Ok(recording)
}

/// Encode samples as little-endian f32
pub fn encode_samples(samples: &[f32]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Decode little-endian f32 samples
pub fn decode_samples(bytes: &[u8]) -> Result<Vec<f32>, PersistenceError> {
    if bytes.len() % 4 != 0 {
        return Err(PersistenceError::Corrupt(format!(
            "audio entry of {} bytes is not a whole number of samples",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

/// Write a recording container to `writer`, returning the writer
pub fn serialize<W: Write + Seek>(recording: &Recording, writer: W) -> Result<W, PersistenceError> {
    let metadata = serde_json::to_string_pretty(&metadata_of(recording))?;
    let body = ron::to_string(&recording_to_file(recording))?;

    let mut zip = ZipWriter::new(writer);

    zip.start_file(METADATA_ENTRY, entry_options())?;
    zip.write_all(metadata.as_bytes())?;

    zip.start_file(BODY_ENTRY, entry_options())?;
    zip.write_all(body.as_bytes())?;

    for (index, section) in recording.sections().iter().enumerate() {
        zip.start_file(audio_entry(index), entry_options())?;
        zip.write_all(&encode_samples(section.samples()))?;
    }

    Ok(zip.finish()?)
}

/// Read only the metadata record of a recording container
pub fn read_metadata<R: Read + Seek>(reader: R) -> Result<RecordingMetaData, PersistenceError> {
    let mut archive = ZipArchive::new(reader)?;
    read_metadata_entry(&mut archive)
}

/// Read a full recording container
pub fn deserialize<R: Read + Seek>(reader: R) -> Result<Recording, PersistenceError> {
    let mut archive = ZipArchive::new(reader)?;
    let metadata = read_metadata_entry(&mut archive)?;

    let body = read_entry(&mut archive, BODY_ENTRY)?;
    let body = std::str::from_utf8(&body)
        .map_err(|e| PersistenceError::Corrupt(format!("body is not UTF-8: {}", e)))?;
    let file: RecordingFile = ron::from_str(body)?;
    check_version(file.version)?;

    let mut audio = Vec::with_capacity(file.sections.len());
    for index in 0..file.sections.len() {
        audio.push(decode_samples(&read_entry(&mut archive, &audio_entry(index))?)?);
    }

    let recording = recording_from_file(file, audio)?;

    if metadata.id != recording.id()
        || metadata.name != recording.name
        || metadata.length != recording.total_samples() as u64
    {
        return Err(PersistenceError::Corrupt(
            "metadata record does not describe the stored recording".to_string(),
        ));
    }

    Ok(recording)
}

fn read_metadata_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> Result<RecordingMetaData, PersistenceError> {
    let bytes = read_entry(archive, METADATA_ENTRY)?;
    let metadata: RecordingMetaData = serde_json::from_slice(&bytes)?;
    check_version(metadata.version)?;
    Ok(metadata)
}

fn read_entry<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<Vec<u8>, PersistenceError> {
    let mut entry = archive.by_name(name).map_err(|e| match e {
        ZipError::FileNotFound => PersistenceError::MissingEntry(name.to_string()),
        other => PersistenceError::Zip(other),
    })?;
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn check_version(found: FormatVersion) -> Result<(), PersistenceError> {
    let expected = FormatVersion::current();
    if found != expected {
        return Err(PersistenceError::VersionMismatch { found, expected });
    }
    Ok(())
}
