//! Spectral pitch model
//!
//! A lightweight [`PitchModel`] built on an FFT harmonic-salience estimate.
//! It reproduces the engine contract (predictions, log spectrum,
//! reconstruction, power) so the full pipeline runs without a trained
//! network. Its recurrent state is a one-frame confidence smoother, reset by
//! `prime`.

use crate::analysis::config::AnalysisConfig;
use crate::analysis::engine::{EngineError, InferenceOutput, PitchModel};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Number of harmonics summed into each pitch salience
const HARMONICS: usize = 4;
/// Frames quieter than this RMS report no pitch at all
const SILENCE_RMS: f32 = 1e-4;
/// Weight of the previous frame in the confidence smoother
const SMOOTHING: f32 = 0.3;
/// Floor added before taking the log of a magnitude
const MAGNITUDE_FLOOR: f32 = 1e-9;

pub struct SpectralModel {
    config: AnalysisConfig,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    previous: Option<Vec<f32>>,
}

impl SpectralModel {
    pub fn new(config: AnalysisConfig) -> Self {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(config.frame_size);
        let inverse = planner.plan_fft_inverse(config.frame_size);
        let window = hann_window(config.frame_size);
        Self {
            config,
            forward,
            inverse,
            window,
            previous: None,
        }
    }

    /// Harmonic salience for every configured pitch, normalized to [0, 1]
    fn salience(&self, magnitudes: &[f32]) -> Vec<f32> {
        let n = self.config.frame_size as f32;
        let sample_rate = self.config.sample_rate as f32;
        let nyquist_bin = magnitudes.len();

        let raw: Vec<f32> = (0..self.config.pitch_count)
            .map(|index| {
                let pitch = self.config.base_pitch as f32 + index as f32;
                let frequency = 440.0 * 2f32.powf((pitch - 69.0) / 12.0);
                (1..=HARMONICS)
                    .map(|h| {
                        let bin = (frequency * h as f32 * n / sample_rate).round() as usize;
                        if bin < nyquist_bin {
                            magnitudes[bin] / h as f32
                        } else {
                            0.0
                        }
                    })
                    .sum()
            })
            .collect();

        let peak = raw.iter().cloned().fold(0.0f32, f32::max);
        if peak <= 0.0 {
            return vec![0.0; raw.len()];
        }
        raw.iter().map(|s| (s / peak).powi(2)).collect()
    }
}

impl PitchModel for SpectralModel {
    fn prime(&mut self, _initial_frame: &[f32]) -> Result<(), EngineError> {
        self.previous = None;
        Ok(())
    }

    fn infer(&mut self, frame: &[f32]) -> Result<InferenceOutput, EngineError> {
        if frame.len() != self.config.frame_size {
            return Err(EngineError::FrameSize {
                expected: self.config.frame_size,
                actual: frame.len(),
            });
        }

        let mean = frame.iter().sum::<f32>() / frame.len() as f32;
        let mut buffer: Vec<Complex<f32>> = frame
            .iter()
            .zip(&self.window)
            .map(|(s, w)| Complex::new((s - mean) * w, 0.0))
            .collect();
        self.forward.process(&mut buffer);

        let half = self.config.frame_size / 2 + 1;
        let magnitudes: Vec<f32> = buffer[..half].iter().map(|c| c.norm()).collect();

        let spectrum: Vec<f32> = (0..self.config.spectrum_bins)
            .map(|bin| {
                let magnitude = magnitudes.get(bin).copied().unwrap_or(0.0);
                20.0 * (magnitude + MAGNITUDE_FLOOR).log10()
            })
            .collect();

        // Zero-phase resynthesis: keep the magnitudes, drop the phases
        let mut resynthesis: Vec<Complex<f32>> =
            buffer.iter().map(|c| Complex::new(c.norm(), 0.0)).collect();
        self.inverse.process(&mut resynthesis);
        let scale = 1.0 / self.config.frame_size as f32;
        let reconstruction: Vec<f32> = resynthesis.iter().map(|c| c.re * scale).collect();

        let power = (reconstruction.iter().map(|s| s * s).sum::<f32>()
            / reconstruction.len() as f32)
            .sqrt();

        let rms = (frame.iter().map(|s| (s - mean) * (s - mean)).sum::<f32>()
            / frame.len() as f32)
            .sqrt();
        let mut predictions = if rms < SILENCE_RMS {
            vec![0.0; self.config.pitch_count]
        } else {
            self.salience(&magnitudes)
        };

        if let Some(previous) = &self.previous {
            for (current, before) in predictions.iter_mut().zip(previous) {
                *current = (1.0 - SMOOTHING) * *current + SMOOTHING * before;
            }
        }
        self.previous = Some(predictions.clone());

        Ok(InferenceOutput {
            predictions,
            spectrum,
            reconstruction,
            power,
        })
    }

    fn name(&self) -> &str {
        "spectral model"
    }
}

fn hann_window(n: usize) -> Vec<f32> {
    if n < 2 {
        return vec![1.0; n];
    }
    let n_minus_1 = (n - 1) as f32;
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos()))
        .collect()
}
