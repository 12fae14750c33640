// PitchFrame - one inference result and the samples it was computed from

use crate::analysis::engine::InferenceOutput;

/// An analysed inference window, immutable once created
#[derive(Debug, Clone, PartialEq)]
pub struct PitchFrame {
    pub samples: Vec<f32>,
    pub predictions: Vec<f32>,
    pub spectrum: Vec<f32>,
    pub reconstruction: Vec<f32>,
    pub power: f32,
}

impl PitchFrame {
    pub fn new(samples: Vec<f32>, output: InferenceOutput) -> Self {
        Self {
            samples,
            predictions: output.predictions,
            spectrum: output.spectrum,
            reconstruction: output.reconstruction,
            power: output.power,
        }
    }

    /// Pitches whose confidence reaches `cutoff`, ascending
    ///
    /// Prediction index `i` maps to pitch `base_pitch + i`.
    pub fn active_pitches(&self, base_pitch: u8, cutoff: f32) -> Vec<u8> {
        active_pitches(&self.predictions, base_pitch, cutoff)
    }

    /// Most confident pitch regardless of the cutoff
    pub fn strongest_pitch(&self, base_pitch: u8) -> Option<(u8, f32)> {
        self.predictions
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_finite())
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, c)| (base_pitch + i as u8, *c))
    }
}

/// Threshold filter over a prediction vector
pub fn active_pitches(predictions: &[f32], base_pitch: u8, cutoff: f32) -> Vec<u8> {
    predictions
        .iter()
        .enumerate()
        .filter(|(_, confidence)| **confidence >= cutoff)
        .map(|(index, _)| base_pitch + index as u8)
        .collect()
}
