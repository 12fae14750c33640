// Shared fixtures for integration tests
#![allow(dead_code)]

use fretscribe::{
    AnalysisConfig, EngineError, InferenceEngine, InferenceOutput, PitchModel, Recording, Tuning,
};

/// Reads a pitch bitmask from the first sample of each frame
///
/// Bit `b` set means pitch `base_pitch + b` is active.
pub struct ChordModel {
    config: AnalysisConfig,
}

impl PitchModel for ChordModel {
    fn prime(&mut self, _initial_frame: &[f32]) -> Result<(), EngineError> {
        Ok(())
    }

    fn infer(&mut self, frame: &[f32]) -> Result<InferenceOutput, EngineError> {
        let mask = frame[0].max(0.0) as u32;
        let predictions = (0..self.config.pitch_count)
            .map(|bit| if bit < 32 && mask & (1 << bit) != 0 { 0.9 } else { 0.05 })
            .collect();
        Ok(InferenceOutput {
            predictions,
            spectrum: vec![-60.0; self.config.spectrum_bins],
            reconstruction: frame.to_vec(),
            power: mask as f32,
        })
    }
}

pub fn config() -> AnalysisConfig {
    AnalysisConfig {
        frame_size: 4,
        stride: 2,
        padding: 2,
        pitch_count: 12,
        spectrum_bins: 3,
        min_section_length: 2,
        ..AnalysisConfig::default()
    }
}

pub fn engine() -> InferenceEngine {
    InferenceEngine::new(Box::new(ChordModel { config: config() }), config())
}

pub fn chord_frame(mask: u32) -> Vec<f32> {
    vec![mask as f32; 4]
}

/// Capture one gathered section holding one step per mask
pub fn record_section(recording: &mut Recording, engine: &InferenceEngine, masks: &[u32]) {
    recording.start_section().unwrap();
    for mask in masks {
        recording.append_frame(&chord_frame(*mask), engine).unwrap();
    }
    recording.end_section();
}

pub fn recording_with(sections: &[&[u32]]) -> Recording {
    let engine = engine();
    let mut recording = Recording::new("Fixture", Tuning::standard_guitar(), config());
    for masks in sections {
        record_section(&mut recording, &engine, masks);
    }
    recording
}

/// Active pitches of every time step in timeline order
pub fn timeline_pitches(recording: &Recording) -> Vec<Vec<u8>> {
    recording
        .sections()
        .iter()
        .flat_map(|section| section.pitch_sets())
        .map(|mut pitches| {
            pitches.sort_unstable();
            pitches
        })
        .collect()
}
