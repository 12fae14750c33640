// Analysis configuration - constants shared by the inference engine and the timeline
//
// The engine decides these, the timeline honors them: frames handed to the
// engine are `frame_size` samples long, consecutive frames advance by
// `stride` samples and overlap by `padding` samples.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Errors raised while loading or validating an analysis configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid analysis configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON error: {0}")]
    Ron(#[from] ron::Error),

    #[error("RON parse error: {0}")]
    RonParse(#[from] ron::error::SpannedError),
}

/// Frame and pitch layout of the inference engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Sample rate of captured audio (Hz)
    pub sample_rate: u32,
    /// Samples per inference window (F)
    pub frame_size: usize,
    /// New samples consumed per time step
    pub stride: usize,
    /// Samples of the window that overlap the previous one
    pub padding: usize,
    /// MIDI pitch of prediction index 0
    pub base_pitch: u8,
    /// Number of pitch classes predicted per frame (P)
    pub pitch_count: usize,
    /// Number of spectral bins per frame (M)
    pub spectrum_bins: usize,
    /// Confidence at or above which a pitch counts as active
    pub confidence_cutoff: f32,
    /// Smallest section (in time steps) a cut may produce
    pub min_section_length: usize,
}

impl Default for AnalysisConfig {
    /// Reference configuration: E2..E6 at 22.05 kHz
    fn default() -> Self {
        Self {
            sample_rate: 22050,
            frame_size: 2048,
            stride: 512,
            padding: 1536,
            base_pitch: 40,
            pitch_count: 49,
            spectrum_bins: 1025,
            confidence_cutoff: 0.5,
            min_section_length: 8,
        }
    }
}

impl AnalysisConfig {
    /// Load a configuration from a RON file and validate it
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: AnalysisConfig = ron::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty RON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let text = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::Invalid("sample rate must be > 0".to_string()));
        }
        if self.frame_size == 0 {
            return Err(ConfigError::Invalid("frame size must be > 0".to_string()));
        }
        if self.stride == 0 || self.stride > self.frame_size {
            return Err(ConfigError::Invalid(format!(
                "stride must be between 1 and the frame size ({})",
                self.frame_size
            )));
        }
        if self.padding != self.frame_size - self.stride {
            return Err(ConfigError::Invalid(format!(
                "padding {} must equal frame size minus stride ({})",
                self.padding,
                self.frame_size - self.stride
            )));
        }
        if self.pitch_count == 0 || self.base_pitch as usize + self.pitch_count > 128 {
            return Err(ConfigError::Invalid(format!(
                "pitch range {}..{} is outside MIDI range",
                self.base_pitch,
                self.base_pitch as usize + self.pitch_count
            )));
        }
        if self.spectrum_bins == 0 {
            return Err(ConfigError::Invalid(
                "spectrum must have at least one bin".to_string(),
            ));
        }
        if !(self.confidence_cutoff > 0.0 && self.confidence_cutoff <= 1.0) {
            return Err(ConfigError::Invalid(
                "confidence cutoff must be in (0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    /// Highest pitch the engine can report, exclusive
    pub fn pitch_end(&self) -> usize {
        self.base_pitch as usize + self.pitch_count
    }

    /// Number of time steps a buffer of `samples` samples can feed
    pub fn frames_in(&self, samples: usize) -> usize {
        if samples < self.frame_size {
            0
        } else {
            (samples - self.frame_size) / self.stride + 1
        }
    }

    /// Duration of one time step in seconds
    pub fn step_seconds(&self) -> f64 {
        self.stride as f64 / self.sample_rate as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_is_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.padding, config.frame_size - config.stride);
        assert_eq!(config.pitch_end(), 89);
    }

    #[test]
    fn test_frames_in() {
        let config = AnalysisConfig::default();
        assert_eq!(config.frames_in(0), 0);
        assert_eq!(config.frames_in(2047), 0);
        assert_eq!(config.frames_in(2048), 1);
        assert_eq!(config.frames_in(2048 + 511), 1);
        assert_eq!(config.frames_in(2048 + 512), 2);
    }

    #[test]
    fn test_invalid_pitch_range() {
        let config = AnalysisConfig {
            base_pitch: 100,
            pitch_count: 40,
            ..AnalysisConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("outside MIDI range"));
    }

    #[test]
    fn test_invalid_stride() {
        let config = AnalysisConfig {
            stride: 0,
            ..AnalysisConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_padding_must_match_overlap() {
        let config = AnalysisConfig {
            frame_size: 4,
            stride: 2,
            padding: 0,
            ..AnalysisConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("frame size minus stride"));

        let config = AnalysisConfig {
            padding: 2,
            ..config
        };
        assert!(config.validate().is_ok());

        let config = AnalysisConfig {
            stride: 4,
            padding: 0,
            ..config
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_load_cycle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("analysis.ron");

        let config = AnalysisConfig {
            min_section_length: 3,
            confidence_cutoff: 0.6,
            ..AnalysisConfig::default()
        };
        config.save(&path).unwrap();

        let loaded = AnalysisConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_rejects_invalid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.ron");
        let config = AnalysisConfig {
            padding: 10_000,
            ..AnalysisConfig::default()
        };
        config.save(&path).unwrap();

        assert!(matches!(
            AnalysisConfig::load(&path),
            Err(ConfigError::Invalid(_))
        ));
    }
}
