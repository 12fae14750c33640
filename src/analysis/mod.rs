// Analysis module - inference engine boundary and frame-level data

pub mod config;
pub mod engine;
pub mod frame;
pub mod spectral;

pub use config::{AnalysisConfig, ConfigError};
pub use engine::{EngineError, InferenceEngine, InferenceOutput, PitchModel};
pub use frame::PitchFrame;
pub use spectral::SpectralModel;
