// Module audio - WAV file import and export

pub mod wav;

pub use wav::{
    MonoAudio, WavError, decode_mono, export_section_wav, export_wav, read_wav_mono, write_mono,
};
