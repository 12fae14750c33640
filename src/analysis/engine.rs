// Inference engine boundary
//
// A pitch model is stateful (recurrent) and sequential: every call goes
// through one shared handle that serializes calls process-wide.

use crate::analysis::config::AnalysisConfig;
use crate::analysis::frame::PitchFrame;
use std::sync::{Arc, Mutex};

/// Errors reported by the inference engine
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Frame has {actual} samples, engine expects {expected}")]
    FrameSize { expected: usize, actual: usize },

    #[error("Model returned {actual} {what}, expected {expected}")]
    OutputShape {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Inference engine lock poisoned")]
    LockPoisoned,
}

/// Raw output of one inference call
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOutput {
    /// Confidence per pitch class (P values)
    pub predictions: Vec<f32>,
    /// Magnitude per frequency bin, log scale (M values)
    pub spectrum: Vec<f32>,
    /// Phase-removed waveform (F values)
    pub reconstruction: Vec<f32>,
    /// Loudness of the reconstruction
    pub power: f32,
}

impl InferenceOutput {
    /// Check the output against the configured layout
    pub fn check_shape(&self, config: &AnalysisConfig) -> Result<(), EngineError> {
        let checks = [
            ("predictions", config.pitch_count, self.predictions.len()),
            ("spectrum bins", config.spectrum_bins, self.spectrum.len()),
            ("reconstruction samples", config.frame_size, self.reconstruction.len()),
        ];
        for (what, expected, actual) in checks {
            if expected != actual {
                return Err(EngineError::OutputShape {
                    what,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }
}

/// A pitch inference model
///
/// `prime` resets the recurrent state and must be called exactly once at the
/// start of every section, before its first `infer`.
pub trait PitchModel: Send {
    fn prime(&mut self, initial_frame: &[f32]) -> Result<(), EngineError>;

    fn infer(&mut self, frame: &[f32]) -> Result<InferenceOutput, EngineError>;

    fn name(&self) -> &str {
        "pitch model"
    }
}

/// Shared, serialized handle to one pitch model
///
/// Cloning shares the same model; calls from different threads queue on the
/// model lock.
#[derive(Clone)]
pub struct InferenceEngine {
    model: Arc<Mutex<Box<dyn PitchModel>>>,
    config: AnalysisConfig,
}

impl InferenceEngine {
    pub fn new(model: Box<dyn PitchModel>, config: AnalysisConfig) -> Self {
        Self {
            model: Arc::new(Mutex::new(model)),
            config,
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn prime(&self, initial_frame: &[f32]) -> Result<(), EngineError> {
        self.check_frame(initial_frame)?;
        let mut model = self.model.lock().map_err(|_| EngineError::LockPoisoned)?;
        log::debug!("Priming {}", model.name());
        model.prime(initial_frame)
    }

    pub fn infer(&self, frame: &[f32]) -> Result<InferenceOutput, EngineError> {
        self.check_frame(frame)?;
        let mut model = self.model.lock().map_err(|_| EngineError::LockPoisoned)?;
        let output = model.infer(frame)?;
        output.check_shape(&self.config)?;
        Ok(output)
    }

    /// Prime (unless `primed` is already set) and infer under a single lock
    /// acquisition, so no other caller can slip a frame in between
    ///
    /// `primed` is set as soon as `prime` succeeds and stays set when the
    /// following `infer` fails.
    pub fn analyze(&self, frame: &[f32], primed: &mut bool) -> Result<PitchFrame, EngineError> {
        self.check_frame(frame)?;
        let mut model = self.model.lock().map_err(|_| EngineError::LockPoisoned)?;
        if !*primed {
            log::debug!("Priming {}", model.name());
            model.prime(frame)?;
            *primed = true;
        }
        let output = model.infer(frame)?;
        output.check_shape(&self.config)?;
        Ok(PitchFrame::new(frame.to_vec(), output))
    }

    fn check_frame(&self, frame: &[f32]) -> Result<(), EngineError> {
        if frame.len() != self.config.frame_size {
            return Err(EngineError::FrameSize {
                expected: self.config.frame_size,
                actual: frame.len(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
