use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "fretscribe", about = "Transcribe and edit guitar recordings", version)]
pub struct Cli {
    /// Analysis configuration (RON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyse a WAV file into a new recording
    Transcribe {
        /// Input WAV file
        input: PathBuf,

        /// Output recording; defaults to the recordings directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Recording name; defaults to the input file stem
        #[arg(short, long)]
        name: Option<String>,

        #[arg(short, long, value_enum, default_value_t = Instrument::Guitar)]
        tuning: Instrument,

        /// Start a new section every N seconds
        #[arg(long)]
        section_seconds: Option<f64>,
    },

    /// List recordings in a directory
    List {
        /// Defaults to the recordings directory
        dir: Option<PathBuf>,
    },

    /// Print a recording's sections and notes
    Show {
        file: PathBuf,

        /// Print every note
        #[arg(long)]
        notes: bool,
    },

    /// Split the section containing a time step
    Cut { file: PathBuf, time_step: usize },

    /// Move a section to another position
    Move {
        file: PathBuf,
        from: usize,
        to: usize,
    },

    /// Exchange two sections
    Swap { file: PathBuf, a: usize, b: usize },

    /// Delete a section
    Remove { file: PathBuf, index: usize },

    /// Write a recording's audio to a WAV file
    Export {
        file: PathBuf,
        output: PathBuf,

        /// Export a single section
        #[arg(short, long)]
        section: Option<usize>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Instrument {
    Guitar,
    Bass,
}
