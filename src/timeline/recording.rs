// Recording - the timeline of sections
//
// Sections are contiguous: every section starts where its left neighbour
// ends, for samples, time steps and clusters alike. Every structural edit
// ends with a full left-to-right renumbering pass.

use crate::analysis::config::AnalysisConfig;
use crate::analysis::engine::{EngineError, InferenceEngine};
use crate::timeline::note::Note;
use crate::timeline::section::{Section, SectionId, TimeStep};
use crate::timeline::tuning::Tuning;
use chrono::{DateTime, Utc};
use std::ops::Range;
use uuid::Uuid;

/// Timeline error types
#[derive(Debug, thiserror::Error)]
pub enum TimelineError {
    #[error("Frame has {actual} samples, expected {expected}")]
    FrameSize { expected: usize, actual: usize },

    #[error("Section {0} is gathered and accepts no more audio")]
    SectionGathered(SectionId),

    #[error("Section {0} is still gathering and cannot be edited")]
    SectionGathering(usize),

    #[error("A section is still being captured")]
    CaptureInProgress,

    #[error("No section is being captured")]
    NoActiveSection,

    #[error("Section index {index} out of range (recording has {len} sections)")]
    SectionOutOfRange { index: usize, len: usize },

    #[error("Section {index} offsets do not continue from its left neighbour")]
    OffsetMismatch { index: usize },

    #[error("Inference error: {0}")]
    Engine(#[from] EngineError),
}

/// Result of a cut request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutOutcome {
    /// The section was replaced by the sections at `left` and `right`
    Split { left: usize, right: usize },
    /// No section contains the requested time step
    OutOfRange,
    /// One of the parts would be shorter than the minimum section length
    TooShort,
}

/// A note placed on the recording's absolute time step axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacedNote {
    pub section: SectionId,
    pub pitch: u8,
    pub start: usize,
    pub duration: usize,
}

/// A note cluster placed on the recording's absolute axes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedCluster {
    pub section: SectionId,
    /// Absolute cluster index
    pub index: usize,
    /// Absolute onset time step
    pub start: usize,
    pub pitches: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    id: Uuid,
    pub name: String,
    pub tuning: Tuning,
    config: AnalysisConfig,
    created_at: DateTime<Utc>,
    last_edited_at: DateTime<Utc>,
    sections: Vec<Section>,
    next_section_id: u64,
}

impl Recording {
    pub fn new(name: impl Into<String>, tuning: Tuning, config: AnalysisConfig) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            tuning,
            config,
            created_at: now,
            last_edited_at: now,
            sections: Vec::new(),
            next_section_id: 1,
        }
    }

    /// Reassemble a stored recording; offsets are renumbered from the sections
    pub(crate) fn from_parts(
        id: Uuid,
        name: String,
        tuning: Tuning,
        config: AnalysisConfig,
        created_at: DateTime<Utc>,
        last_edited_at: DateTime<Utc>,
        sections: Vec<Section>,
    ) -> Self {
        let next_section_id = sections.iter().map(|s| s.id().0).max().unwrap_or(0) + 1;
        let mut recording = Self {
            id,
            name,
            tuning,
            config,
            created_at,
            last_edited_at,
            sections,
            next_section_id,
        };
        recording.renumber();
        recording
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_edited_at(&self) -> DateTime<Utc> {
        self.last_edited_at
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn section(&self, index: usize) -> Option<&Section> {
        self.sections.get(index)
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Position and contents of the section with `id`
    pub fn section_by_id(&self, id: SectionId) -> Option<(usize, &Section)> {
        self.sections.iter().enumerate().find(|(_, s)| s.id() == id)
    }

    pub(crate) fn section_by_id_mut(&mut self, id: SectionId) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.id() == id)
    }

    /// The last section, if it is still gathering
    pub fn active_section(&self) -> Option<&Section> {
        self.sections.last().filter(|s| !s.is_gathered())
    }

    pub fn is_capturing(&self) -> bool {
        self.active_section().is_some()
    }

    pub fn total_samples(&self) -> usize {
        self.sections.last().map_or(0, |s| s.sample_end())
    }

    pub fn total_time_steps(&self) -> usize {
        self.sections.last().map_or(0, |s| s.time_step_end())
    }

    pub fn total_clusters(&self) -> usize {
        self.sections.last().map_or(0, |s| s.cluster_end())
    }

    pub fn duration_seconds(&self) -> f64 {
        self.total_samples() as f64 / self.config.sample_rate as f64
    }

    /// Open a new section after the current last one
    pub fn start_section(&mut self) -> Result<SectionId, TimelineError> {
        if self.is_capturing() {
            return Err(TimelineError::CaptureInProgress);
        }
        let id = self.allocate_id();
        let section = Section::new(
            id,
            self.total_samples(),
            self.total_time_steps(),
            self.total_clusters(),
        );
        self.sections.push(section);
        log::info!("Started section {} at index {}", id, self.sections.len() - 1);
        Ok(id)
    }

    /// Finalize the section being captured, if any
    pub fn end_section(&mut self) -> Option<SectionId> {
        let section = self.sections.last_mut().filter(|s| !s.is_gathered())?;
        section.gather();
        let id = section.id();
        log::info!(
            "Gathered section {}: {} time steps, {} notes",
            id,
            section.len(),
            section.notes().len()
        );
        self.touch();
        Some(id)
    }

    /// Analyse one frame into the section being captured
    pub fn append_frame(
        &mut self,
        raw_samples: &[f32],
        engine: &InferenceEngine,
    ) -> Result<&TimeStep, TimelineError> {
        let config = &self.config;
        let section = self
            .sections
            .last_mut()
            .filter(|s| !s.is_gathered())
            .ok_or(TimelineError::NoActiveSection)?;
        section.append_frame(raw_samples, engine, config)
    }

    /// Append captured audio to the section being captured
    pub fn push_samples(&mut self, block: &[f32]) -> Result<SectionId, TimelineError> {
        let section = self
            .sections
            .last_mut()
            .filter(|s| !s.is_gathered())
            .ok_or(TimelineError::NoActiveSection)?;
        section.push_samples(block)?;
        Ok(section.id())
    }

    /// Index of the first section ending after `time_step`
    pub fn section_at(&self, time_step: usize) -> Option<usize> {
        self.sections
            .iter()
            .position(|s| s.time_step_end() > time_step)
    }

    /// Split the section containing `at_time_step` into two
    pub fn cut(&mut self, at_time_step: usize) -> Result<CutOutcome, TimelineError> {
        let Some(index) = self
            .section_at(at_time_step)
            .filter(|i| self.sections[*i].contains_time_step(at_time_step))
        else {
            return Ok(CutOutcome::OutOfRange);
        };
        self.ensure_gathered(index)?;

        let section = &self.sections[index];
        let k = at_time_step - section.time_step_start();
        let minimum = self.config.min_section_length.max(1);
        if k < minimum || section.len() - k < minimum {
            log::debug!(
                "Rejected cut at {}: parts of {} and {} steps, minimum {}",
                at_time_step,
                k,
                section.len() - k,
                minimum
            );
            return Ok(CutOutcome::TooShort);
        }

        let left_id = section.id();
        let right_id = self.allocate_id();
        let (left, right) = self.sections[index].split_at(k, &self.config, left_id, right_id);
        self.sections[index] = left;
        self.sections.insert(index + 1, right);
        self.renumber();
        self.touch();

        log::info!("Cut section {} at time step {}", left_id, at_time_step);
        Ok(CutOutcome::Split {
            left: index,
            right: index + 1,
        })
    }

    /// Exchange the positions of two sections
    pub fn swap_sections(&mut self, a: usize, b: usize) -> Result<(), TimelineError> {
        self.ensure_index(a)?;
        self.ensure_index(b)?;
        self.ensure_gathered(a)?;
        self.ensure_gathered(b)?;

        self.sections.swap(a, b);
        self.renumber();
        self.touch();
        Ok(())
    }

    /// Move the section at `from` so it lands before the section currently at `to`
    ///
    /// `to` may equal the section count to move the section to the end.
    pub fn reinsert_section(&mut self, from: usize, to: usize) -> Result<(), TimelineError> {
        self.ensure_index(from)?;
        if to > self.sections.len() {
            return Err(TimelineError::SectionOutOfRange {
                index: to,
                len: self.sections.len(),
            });
        }
        let target = if to > from { to - 1 } else { to };
        for index in from.min(target)..=from.max(target) {
            self.ensure_gathered(index)?;
        }

        let section = self.sections.remove(from);
        self.sections.insert(target, section);
        self.renumber();
        self.touch();
        Ok(())
    }

    /// Delete a section and return it
    pub fn remove_section(&mut self, index: usize) -> Result<Section, TimelineError> {
        self.ensure_index(index)?;
        self.ensure_gathered(index)?;

        let removed = self.sections.remove(index);
        self.renumber();
        self.touch();
        log::info!("Removed section {}", removed.id());
        Ok(removed)
    }

    /// Recompute every section's start offsets from its left neighbour
    pub fn renumber(&mut self) {
        let (mut sample, mut time_step, mut cluster) = (0, 0, 0);
        for section in &mut self.sections {
            section.set_starts(sample, time_step, cluster);
            sample = section.sample_end();
            time_step = section.time_step_end();
            cluster = section.cluster_end();
        }
    }

    /// Verify every section starts where its left neighbour ends
    pub fn check_offsets(&self) -> Result<(), TimelineError> {
        let (mut sample, mut time_step, mut cluster) = (0, 0, 0);
        for (index, section) in self.sections.iter().enumerate() {
            if section.sample_start() != sample
                || section.time_step_start() != time_step
                || section.cluster_start() != cluster
            {
                return Err(TimelineError::OffsetMismatch { index });
            }
            sample = section.sample_end();
            time_step = section.time_step_end();
            cluster = section.cluster_end();
        }
        Ok(())
    }

    /// Every note with its absolute start, ordered by start then pitch
    pub fn note_layout(&self) -> Vec<PlacedNote> {
        let mut layout: Vec<PlacedNote> = self
            .sections
            .iter()
            .flat_map(|section| {
                section.notes().iter().map(move |note: &Note| PlacedNote {
                    section: section.id(),
                    pitch: note.pitch,
                    start: section.time_step_start() + note.start_frame,
                    duration: note.duration,
                })
            })
            .collect();
        layout.sort_by_key(|n| (n.start, n.pitch));
        layout
    }

    /// Every cluster on the absolute axes, in timeline order
    pub fn cluster_layout(&self) -> Vec<PlacedCluster> {
        self.sections
            .iter()
            .flat_map(|section| {
                section
                    .note_clusters()
                    .iter()
                    .enumerate()
                    .map(move |(i, cluster)| PlacedCluster {
                        section: section.id(),
                        index: section.cluster_start() + i,
                        start: section.time_step_start() + cluster.start,
                        pitches: cluster.pitches.clone(),
                    })
            })
            .collect()
    }

    /// All samples in timeline order
    pub fn samples(&self) -> Vec<f32> {
        self.samples_in(0..self.total_samples())
    }

    /// Samples of an absolute range, clamped to the recording
    pub fn samples_in(&self, range: Range<usize>) -> Vec<f32> {
        let mut out = Vec::with_capacity(range.len());
        for section in &self.sections {
            let start = range.start.max(section.sample_start());
            let end = range.end.min(section.sample_end());
            if start < end {
                out.extend_from_slice(
                    &section.samples()[start - section.sample_start()..end - section.sample_start()],
                );
            }
        }
        out
    }

    fn allocate_id(&mut self) -> SectionId {
        let id = SectionId(self.next_section_id);
        self.next_section_id += 1;
        id
    }

    fn touch(&mut self) {
        self.last_edited_at = Utc::now();
    }

    fn ensure_index(&self, index: usize) -> Result<(), TimelineError> {
        if index >= self.sections.len() {
            return Err(TimelineError::SectionOutOfRange {
                index,
                len: self.sections.len(),
            });
        }
        Ok(())
    }

    fn ensure_gathered(&self, index: usize) -> Result<(), TimelineError> {
        if !self.sections[index].is_gathered() {
            return Err(TimelineError::SectionGathering(index));
        }
        Ok(())
    }
}
