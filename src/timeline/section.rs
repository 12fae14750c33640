// Section - a contiguous run of captured audio and its analysis
//
// Offsets are absolute positions in the owning recording's conceptual flat
// sample / time step / cluster arrays. Only the recording sets them.

use crate::analysis::config::AnalysisConfig;
use crate::analysis::engine::InferenceEngine;
use crate::analysis::frame::{PitchFrame, active_pitches};
use crate::timeline::note::{Note, NoteIndex, NoteTracker};
use crate::timeline::recording::TimelineError;
use serde::{Deserialize, Serialize};

/// Identifier of a section, stable across structural edits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SectionId(pub u64);

impl std::fmt::Display for SectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One processed inference window
#[derive(Debug, Clone, PartialEq)]
pub struct TimeStep {
    /// Position of the window in its section
    pub frame_index: usize,
    pub predictions: Vec<f32>,
    pub spectrum: Vec<f32>,
    pub reconstruction: Vec<f32>,
    pub power: f32,
    /// Notes active in this window, ascending by pitch
    pub notes: Vec<NoteIndex>,
}

impl TimeStep {
    /// Build a time step from an analysed frame; notes are filled by tracking
    pub fn from_frame(frame_index: usize, frame: PitchFrame) -> Self {
        Self {
            frame_index,
            predictions: frame.predictions,
            spectrum: frame.spectrum,
            reconstruction: frame.reconstruction,
            power: frame.power,
            notes: Vec::new(),
        }
    }
}

/// Notes sharing an onset time step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteCluster {
    /// Onset time step, relative to the owning section
    pub start: usize,
    /// Pitches opened at `start`, ascending
    pub pitches: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    id: SectionId,
    sample_start: usize,
    time_step_start: usize,
    cluster_start: usize,
    samples: Vec<f32>,
    time_steps: Vec<TimeStep>,
    notes: Vec<Note>,
    note_clusters: Vec<NoteCluster>,
    is_gathered: bool,
    /// Whether the engine has been primed for this section
    primed: bool,
    tracker: NoteTracker,
}

impl Section {
    /// Empty section starting at the given offsets
    pub(crate) fn new(
        id: SectionId,
        sample_start: usize,
        time_step_start: usize,
        cluster_start: usize,
    ) -> Self {
        Self {
            id,
            sample_start,
            time_step_start,
            cluster_start,
            samples: Vec::new(),
            time_steps: Vec::new(),
            notes: Vec::new(),
            note_clusters: Vec::new(),
            is_gathered: false,
            primed: false,
            tracker: NoteTracker::new(),
        }
    }

    /// Reassemble a section from stored parts
    ///
    /// `pitch_sets[i]` holds the active pitches of `time_steps[i]`; notes are
    /// re-derived from them. Offsets start at zero until the owning recording
    /// renumbers.
    pub(crate) fn from_parts(
        id: SectionId,
        samples: Vec<f32>,
        time_steps: Vec<TimeStep>,
        pitch_sets: &[Vec<u8>],
        note_clusters: Vec<NoteCluster>,
        is_gathered: bool,
    ) -> Self {
        let mut section = Self::new(id, 0, 0, 0);
        section.samples = samples;
        section.primed = !time_steps.is_empty();
        section.time_steps = time_steps;
        section.note_clusters = note_clusters;
        section.is_gathered = is_gathered;
        section.rebuild_notes(pitch_sets);
        section
    }

    pub fn id(&self) -> SectionId {
        self.id
    }

    pub fn sample_start(&self) -> usize {
        self.sample_start
    }

    pub fn sample_end(&self) -> usize {
        self.sample_start + self.samples.len()
    }

    pub fn time_step_start(&self) -> usize {
        self.time_step_start
    }

    pub fn time_step_end(&self) -> usize {
        self.time_step_start + self.time_steps.len()
    }

    pub fn cluster_start(&self) -> usize {
        self.cluster_start
    }

    pub fn cluster_end(&self) -> usize {
        self.cluster_start + self.note_clusters.len()
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn time_steps(&self) -> &[TimeStep] {
        &self.time_steps
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn note_clusters(&self) -> &[NoteCluster] {
        &self.note_clusters
    }

    pub fn is_gathered(&self) -> bool {
        self.is_gathered
    }

    pub fn is_primed(&self) -> bool {
        self.primed
    }

    pub(crate) fn mark_primed(&mut self) {
        self.primed = true;
    }

    /// Number of time steps
    pub fn len(&self) -> usize {
        self.time_steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time_steps.is_empty()
    }

    /// Whether `time_step` (absolute) falls inside this section
    pub fn contains_time_step(&self, time_step: usize) -> bool {
        time_step >= self.time_step_start && time_step < self.time_step_end()
    }

    /// Notes still open after the latest frame
    pub fn open_notes(&self) -> Vec<&Note> {
        self.tracker
            .open_notes()
            .into_iter()
            .map(|index| &self.notes[index])
            .collect()
    }

    /// Notes active at section-relative step `step`
    pub fn notes_at(&self, step: usize) -> Vec<&Note> {
        self.time_steps
            .get(step)
            .map(|s| s.notes.iter().map(|i| &self.notes[*i]).collect())
            .unwrap_or_default()
    }

    /// Active pitches of every time step
    pub fn pitch_sets(&self) -> Vec<Vec<u8>> {
        self.time_steps
            .iter()
            .map(|step| step.notes.iter().map(|i| self.notes[*i].pitch).collect())
            .collect()
    }

    pub fn duration_seconds(&self, config: &AnalysisConfig) -> f64 {
        self.samples.len() as f64 / config.sample_rate as f64
    }

    /// Finalize capture; no more samples or frames may be appended
    pub fn gather(&mut self) {
        self.is_gathered = true;
    }

    /// Analyse one full inference window and append it
    ///
    /// The first frame contributes all of its samples, later frames only their
    /// trailing `stride` samples, since consecutive windows overlap by
    /// `padding`. The engine is primed once, before the first frame, even if
    /// that frame's inference then fails.
    pub fn append_frame(
        &mut self,
        raw_samples: &[f32],
        engine: &InferenceEngine,
        config: &AnalysisConfig,
    ) -> Result<&TimeStep, TimelineError> {
        if raw_samples.len() != config.frame_size {
            return Err(TimelineError::FrameSize {
                expected: config.frame_size,
                actual: raw_samples.len(),
            });
        }
        self.ensure_open()?;

        let frame = engine.analyze(raw_samples, &mut self.primed)?;

        let fresh = if self.time_steps.is_empty() {
            config.frame_size
        } else {
            config.stride
        };
        self.samples
            .extend_from_slice(&raw_samples[config.frame_size - fresh..]);

        self.record_frame(frame, config)
    }

    /// Append captured audio without analysing it
    pub fn push_samples(&mut self, block: &[f32]) -> Result<(), TimelineError> {
        self.ensure_open()?;
        self.samples.extend_from_slice(block);
        Ok(())
    }

    /// Copy of the next window not yet analysed, if enough samples arrived
    pub fn pending_frame(&self, config: &AnalysisConfig) -> Option<Vec<f32>> {
        let start = self.time_steps.len() * config.stride;
        let end = start + config.frame_size;
        if self.is_gathered || end > self.samples.len() {
            return None;
        }
        Some(self.samples[start..end].to_vec())
    }

    /// Append an analysed frame whose samples are already in the buffer
    pub fn record_frame(
        &mut self,
        frame: PitchFrame,
        config: &AnalysisConfig,
    ) -> Result<&TimeStep, TimelineError> {
        self.ensure_open()?;

        let frame_index = self.time_steps.len();
        let pitches = active_pitches(
            &frame.predictions,
            config.base_pitch,
            config.confidence_cutoff,
        );
        let tracked = self.tracker.track(frame_index, &pitches, &mut self.notes);

        if !tracked.onsets.is_empty() {
            self.note_clusters.push(NoteCluster {
                start: frame_index,
                pitches: tracked.onsets,
            });
        }

        let mut step = TimeStep::from_frame(frame_index, frame);
        step.notes = tracked.active;
        log::debug!(
            "Section {} step {}: {} active notes",
            self.id,
            frame_index,
            step.notes.len()
        );
        self.time_steps.push(step);
        Ok(&self.time_steps[frame_index])
    }

    /// Split into the first `k` time steps and the rest
    ///
    /// Samples split at `k * stride + padding`; clusters split at the first
    /// cluster starting at or after `k`. Right-hand time steps and clusters
    /// are rebased to start at zero and both halves re-derive their notes.
    pub(crate) fn split_at(
        &self,
        k: usize,
        config: &AnalysisConfig,
        left_id: SectionId,
        right_id: SectionId,
    ) -> (Section, Section) {
        let sample_split = (k * config.stride + config.padding).min(self.samples.len());
        let cluster_split = self
            .note_clusters
            .iter()
            .position(|c| c.start >= k)
            .unwrap_or(self.note_clusters.len());

        let pitch_sets = self.pitch_sets();
        let (left_pitches, right_pitches) = pitch_sets.split_at(k);

        let left_steps = self.time_steps[..k].to_vec();
        let right_steps = self.time_steps[k..]
            .iter()
            .cloned()
            .map(|mut step| {
                step.frame_index -= k;
                step
            })
            .collect();

        let right_clusters = self.note_clusters[cluster_split..]
            .iter()
            .cloned()
            .map(|mut cluster| {
                cluster.start -= k;
                cluster
            })
            .collect();

        let left = Section::from_parts(
            left_id,
            self.samples[..sample_split].to_vec(),
            left_steps,
            left_pitches,
            self.note_clusters[..cluster_split].to_vec(),
            self.is_gathered,
        );
        let right = Section::from_parts(
            right_id,
            self.samples[sample_split..].to_vec(),
            right_steps,
            right_pitches,
            right_clusters,
            self.is_gathered,
        );
        (left, right)
    }

    pub(crate) fn set_starts(&mut self, sample: usize, time_step: usize, cluster: usize) {
        self.sample_start = sample;
        self.time_step_start = time_step;
        self.cluster_start = cluster;
    }

    fn rebuild_notes(&mut self, pitch_sets: &[Vec<u8>]) {
        let (tracker, notes, active) = NoteTracker::rebuild(pitch_sets);
        self.tracker = tracker;
        self.notes = notes;
        for (step, active) in self.time_steps.iter_mut().zip(active) {
            step.notes = active;
        }
    }

    fn ensure_open(&self) -> Result<(), TimelineError> {
        if self.is_gathered {
            return Err(TimelineError::SectionGathered(self.id));
        }
        Ok(())
    }
}
