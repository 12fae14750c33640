mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use fretscribe::audio::{export_section_wav, export_wav, read_wav_mono};
use fretscribe::capture::{self, Recorder};
use fretscribe::persistence::validate_recording_structure;
use fretscribe::{
    AnalysisConfig, CutOutcome, InferenceEngine, Recording, RecordingManager, SpectralModel,
    Tuning, list_catalog, load_recording, save_recording,
};
use ringbuf::traits::Producer;
use std::path::Path;

use cli::{Cli, Command, Instrument};

// Samples handed to the recorder per pump
const CHANNEL_CAPACITY: usize = 16384;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    run(Cli::parse())
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => {
            let config = AnalysisConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            log::info!("Loaded config from {}", path.display());
            config
        }
        None => AnalysisConfig::default(),
    };

    match cli.command {
        Command::Transcribe {
            input,
            output,
            name,
            tuning,
            section_seconds,
        } => transcribe(&input, output.as_deref(), name, tuning, section_seconds, config),
        Command::List { dir } => list(dir.unwrap_or_else(RecordingManager::default_directory)),
        Command::Show { file, notes } => show(&file, notes),
        Command::Cut { file, time_step } => edit(&file, |recording| {
            match recording.cut(time_step)? {
                CutOutcome::Split { left, right } => {
                    println!("Split into sections {} and {}", left, right);
                    Ok(())
                }
                CutOutcome::OutOfRange => {
                    anyhow::bail!("Time step {} is outside the recording", time_step)
                }
                CutOutcome::TooShort => anyhow::bail!(
                    "Cutting at {} would leave a section shorter than {} steps",
                    time_step,
                    recording.config().min_section_length.max(1)
                ),
            }
        }),
        Command::Move { file, from, to } => edit(&file, |recording| {
            recording.reinsert_section(from, to)?;
            println!("Moved section {} to position {}", from, to);
            Ok(())
        }),
        Command::Swap { file, a, b } => edit(&file, |recording| {
            recording.swap_sections(a, b)?;
            println!("Swapped sections {} and {}", a, b);
            Ok(())
        }),
        Command::Remove { file, index } => edit(&file, |recording| {
            let section = recording.remove_section(index)?;
            println!(
                "Removed section {} ({} time steps)",
                section.id(),
                section.len()
            );
            Ok(())
        }),
        Command::Export {
            file,
            output,
            section,
        } => {
            let recording = load_recording(&file)
                .with_context(|| format!("Failed to load {}", file.display()))?;
            match section {
                Some(index) => export_section_wav(&recording, index, &output)?,
                None => export_wav(&recording, &output)?,
            }
            Ok(())
        }
    }
}

fn transcribe(
    input: &Path,
    output: Option<&Path>,
    name: Option<String>,
    instrument: Instrument,
    section_seconds: Option<f64>,
    mut config: AnalysisConfig,
) -> Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file not found: {}", input.display());
    }

    let audio = read_wav_mono(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    if audio.sample_rate != config.sample_rate {
        log::info!(
            "Analysing at the file's sample rate ({} Hz instead of {} Hz)",
            audio.sample_rate,
            config.sample_rate
        );
        config.sample_rate = audio.sample_rate;
    }
    config.validate()?;

    let tuning = match instrument {
        Instrument::Guitar => Tuning::standard_guitar(),
        Instrument::Bass => Tuning::standard_bass(),
    };
    let name = name.unwrap_or_else(|| {
        input
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "Untitled".to_string())
    });

    let model = SpectralModel::new(config.clone());
    let engine = InferenceEngine::new(Box::new(model), config.clone());
    let shared = capture::share(Recording::new(name, tuning, config.clone()));
    let (mut producer, consumer) = capture::create_sample_channel(CHANNEL_CAPACITY);
    let mut recorder = Recorder::new(shared.clone(), engine, consumer);

    let section_length = section_seconds
        .filter(|s| *s > 0.0)
        .map(|s| ((s * config.sample_rate as f64) as usize).max(config.frame_size))
        .unwrap_or(audio.samples.len().max(1));

    for section in audio.samples.chunks(section_length) {
        recorder.start_section()?;
        for chunk in section.chunks(CHANNEL_CAPACITY) {
            producer.push_slice(chunk);
            recorder.pump()?;
        }
        recorder.finish_section()?;
    }

    let recording = shared
        .lock()
        .map_err(|_| anyhow::anyhow!("Recording lock poisoned"))?
        .clone();
    validate_recording_structure(&recording)?;

    let path = match output {
        Some(path) => {
            save_recording(&recording, path)?;
            path.to_path_buf()
        }
        None => RecordingManager::new(RecordingManager::default_directory(), config)
            .save(&recording)?,
    };

    println!(
        "Transcribed {:.2}s into {} sections, {} notes: {}",
        recording.duration_seconds(),
        recording.section_count(),
        recording.note_layout().len(),
        path.display()
    );
    Ok(())
}

fn list(dir: std::path::PathBuf) -> Result<()> {
    if !dir.exists() {
        println!("No recordings in {}", dir.display());
        return Ok(());
    }

    let catalog = list_catalog(&dir)?;
    if catalog.is_empty() {
        println!("No recordings in {}", dir.display());
        return Ok(());
    }
    for entry in catalog {
        println!(
            "  {:<24} {:>8.2}s  edited {}  {}",
            entry.metadata.name,
            entry.metadata.duration_seconds(),
            entry.metadata.last_edited_at.format("%Y-%m-%d %H:%M"),
            entry.path.display()
        );
    }
    Ok(())
}

fn show(file: &Path, notes: bool) -> Result<()> {
    let recording =
        load_recording(file).with_context(|| format!("Failed to load {}", file.display()))?;

    println!("{} ({})", recording.name, recording.id());
    println!("  Tuning: {}", recording.tuning);
    println!(
        "  Duration: {:.2}s, {} time steps, {} clusters",
        recording.duration_seconds(),
        recording.total_time_steps(),
        recording.total_clusters()
    );

    for (index, section) in recording.sections().iter().enumerate() {
        println!(
            "  [{}] {} steps {}..{} ({:.2}s), {} notes{}",
            index,
            section.id(),
            section.time_step_start(),
            section.time_step_end(),
            section.duration_seconds(recording.config()),
            section.notes().len(),
            if section.is_gathered() { "" } else { ", gathering" }
        );
    }

    if notes {
        let step = recording.config().step_seconds();
        for note in recording.note_layout() {
            println!(
                "    {:>8.3}s  {:<4} {:>4} steps  {}",
                note.start as f64 * step,
                fretscribe::Note::new(note.pitch, 0).note_name(),
                note.duration,
                note.section
            );
        }
    }
    Ok(())
}

/// Load, edit and save a recording in place
fn edit<F>(file: &Path, apply: F) -> Result<()>
where
    F: FnOnce(&mut Recording) -> Result<()>,
{
    let mut recording =
        load_recording(file).with_context(|| format!("Failed to load {}", file.display()))?;
    apply(&mut recording)?;
    recording.check_offsets()?;
    save_recording(&recording, file)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fretscribe::analysis::engine::{EngineError, InferenceOutput, PitchModel};
    use fretscribe::audio::write_mono;
    use std::path::PathBuf;
    use tempfile::tempdir;

    /// Reports pitch `base + frame[0]`
    struct LevelModel {
        config: AnalysisConfig,
    }

    impl PitchModel for LevelModel {
        fn prime(&mut self, _initial_frame: &[f32]) -> Result<(), EngineError> {
            Ok(())
        }

        fn infer(&mut self, frame: &[f32]) -> Result<InferenceOutput, EngineError> {
            let mut predictions = vec![0.0; self.config.pitch_count];
            predictions[frame[0] as usize % self.config.pitch_count] = 0.9;
            Ok(InferenceOutput {
                predictions,
                spectrum: vec![0.0; self.config.spectrum_bins],
                reconstruction: frame.to_vec(),
                power: 0.5,
            })
        }
    }

    fn small_config() -> AnalysisConfig {
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

    fn saved_recording(dir: &Path) -> PathBuf {
        let config = small_config();
        let engine = InferenceEngine::new(
            Box::new(LevelModel {
                config: config.clone(),
            }),
            config.clone(),
        );
        let mut recording = Recording::new("Take", Tuning::default(), config);
        recording.start_section().unwrap();
        for level in [0.0, 0.0, 0.0, 3.0, 3.0, 3.0] {
            recording.append_frame(&[level; 4], &engine).unwrap();
        }
        recording.end_section();

        let path = dir.join("take.fretrec");
        save_recording(&recording, &path).unwrap();
        path
    }

    fn run_args(args: &[&str]) -> Result<()> {
        run(Cli::parse_from(
            std::iter::once("fretscribe").chain(args.iter().copied()),
        ))
    }

    #[test]
    fn test_cut_then_swap_in_place() {
        let dir = tempdir().unwrap();
        let path = saved_recording(dir.path());
        let file = path.to_str().unwrap();

        run_args(&["cut", file, "3"]).unwrap();
        let cut = load_recording(&path).unwrap();
        assert_eq!(cut.section_count(), 2);
        assert_eq!(cut.section(1).unwrap().time_step_start(), 3);
        assert_eq!(cut.section(1).unwrap().notes()[0].pitch, 43);

        run_args(&["swap", file, "0", "1"]).unwrap();
        let swapped = load_recording(&path).unwrap();
        assert_eq!(swapped.section(0).unwrap().id(), cut.section(1).unwrap().id());
        swapped.check_offsets().unwrap();
    }

    #[test]
    fn test_rejected_cut_leaves_file_alone() {
        let dir = tempdir().unwrap();
        let path = saved_recording(dir.path());
        let before = load_recording(&path).unwrap();

        assert!(run_args(&["cut", path.to_str().unwrap(), "99"]).is_err());
        assert!(run_args(&["cut", path.to_str().unwrap(), "1"]).is_err());
        assert!(run_args(&["remove", path.to_str().unwrap(), "4"]).is_err());

        let after = load_recording(&path).unwrap();
        assert_eq!(after, before);
    }

    #[test]
    fn test_list_and_show() {
        let dir = tempdir().unwrap();
        let path = saved_recording(dir.path());
        std::fs::write(dir.path().join("junk.fretrec"), b"not a recording").unwrap();

        run_args(&["list", dir.path().to_str().unwrap()]).unwrap();
        run_args(&["list", dir.path().join("missing").to_str().unwrap()]).unwrap();
        run_args(&["show", path.to_str().unwrap(), "--notes"]).unwrap();
        assert!(run_args(&["show", dir.path().join("junk.fretrec").to_str().unwrap()]).is_err());
    }

    #[test]
    fn test_transcribe_and_export() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("tone.wav");
        let samples: Vec<f32> = (0..22050)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 220.0 * i as f32 / 22050.0).sin())
            .collect();
        write_mono(
            &samples,
            22050,
            std::io::BufWriter::new(std::fs::File::create(&input).unwrap()),
        )
        .unwrap();

        let output = dir.path().join("tone.fretrec");
        run_args(&[
            "transcribe",
            input.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
            "--section-seconds",
            "0.5",
        ])
        .unwrap();

        let recording = load_recording(&output).unwrap();
        assert_eq!(recording.name, "tone");
        assert_eq!(recording.section_count(), 2);
        assert_eq!(recording.total_samples(), samples.len());

        let wav = dir.path().join("section.wav");
        run_args(&[
            "export",
            output.to_str().unwrap(),
            wav.to_str().unwrap(),
            "--section",
            "1",
        ])
        .unwrap();
        assert_eq!(
            fretscribe::audio::read_wav_mono(&wav).unwrap().samples,
            recording.section(1).unwrap().samples()
        );
    }
}
