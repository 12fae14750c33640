// WAV import and export
//
// Imported audio is mixed down to mono f32 in [-1, 1]. Exports are
// written as mono 32-bit float at the recording's sample rate.

use crate::timeline::recording::Recording;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::fs::File;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::Path;

/// WAV error types
#[derive(Debug, thiserror::Error)]
pub enum WavError {
    #[error("WAV error: {0}")]
    Hound(#[from] hound::Error),

    #[error("Unsupported WAV format: {0}")]
    Unsupported(String),
}

/// Mono audio read from a WAV file
#[derive(Debug, Clone, PartialEq)]
pub struct MonoAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl MonoAudio {
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Read a WAV file and mix it down to mono
pub fn read_wav_mono<P: AsRef<Path>>(path: P) -> Result<MonoAudio, WavError> {
    let audio = decode_mono(WavReader::open(path.as_ref())?)?;
    log::info!(
        "Read {} ({} samples at {} Hz)",
        path.as_ref().display(),
        audio.samples.len(),
        audio.sample_rate
    );
    Ok(audio)
}

/// Decode any hound reader to mono
pub fn decode_mono<R: Read>(reader: WavReader<R>) -> Result<MonoAudio, WavError> {
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(WavError::Unsupported("zero channels".to_string()));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => {
            if spec.bits_per_sample != 32 {
                return Err(WavError::Unsupported(format!(
                    "{}-bit float samples",
                    spec.bits_per_sample
                )));
            }
            reader.into_samples::<f32>().collect::<Result<_, _>>()?
        }
        SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(WavError::Unsupported(format!(
                    "{}-bit integer samples",
                    spec.bits_per_sample
                )));
            }
            let scale = (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|s| s as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    let channels = spec.channels as usize;
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok(MonoAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}

fn mono_float_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    }
}

/// Write mono samples to any seekable writer
pub fn write_mono<W: Write + Seek>(
    samples: &[f32],
    sample_rate: u32,
    writer: W,
) -> Result<(), WavError> {
    let mut wav = WavWriter::new(writer, mono_float_spec(sample_rate))?;
    for sample in samples {
        wav.write_sample(*sample)?;
    }
    wav.finalize()?;
    Ok(())
}

/// Export the audio of a whole recording
pub fn export_wav<P: AsRef<Path>>(recording: &Recording, path: P) -> Result<(), WavError> {
    export_samples(&recording.samples(), recording.config().sample_rate, path)
}

/// Export the audio of one section
pub fn export_section_wav<P: AsRef<Path>>(
    recording: &Recording,
    index: usize,
    path: P,
) -> Result<(), WavError> {
    let section = recording.section(index).ok_or_else(|| {
        WavError::Unsupported(format!(
            "section {} out of range ({} sections)",
            index,
            recording.section_count()
        ))
    })?;
    export_samples(section.samples(), recording.config().sample_rate, path)
}

fn export_samples<P: AsRef<Path>>(
    samples: &[f32],
    sample_rate: u32,
    path: P,
) -> Result<(), WavError> {
    let file = File::create(path.as_ref()).map_err(hound::Error::from)?;
    write_mono(samples, sample_rate, BufWriter::new(file))?;
    log::info!(
        "Exported {} samples to {}",
        samples.len(),
        path.as_ref().display()
    );
    Ok(())
}
