// Instrument tuning carried as recording metadata

use serde::{Deserialize, Serialize};

/// String pitches, capo and playable fret range of a fretted instrument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tuning {
    /// Open string MIDI pitches, lowest string first
    pub strings: Vec<u8>,
    /// Capo fret (0 = no capo)
    pub capo: u8,
    /// Highest playable fret
    pub frets: u8,
}

impl Tuning {
    pub fn new(strings: Vec<u8>, capo: u8, frets: u8) -> Self {
        Self {
            strings,
            capo,
            frets,
        }
    }

    /// Standard six-string guitar tuning, E2 A2 D3 G3 B3 E4
    pub fn standard_guitar() -> Self {
        Self::new(vec![40, 45, 50, 55, 59, 64], 0, 22)
    }

    /// Standard four-string bass tuning, E1 A1 D2 G2
    pub fn standard_bass() -> Self {
        Self::new(vec![28, 33, 38, 43], 0, 20)
    }

    /// Lowest sounding pitch with the capo applied
    pub fn lowest_pitch(&self) -> Option<u8> {
        self.strings.iter().min().map(|p| p.saturating_add(self.capo))
    }

    /// Highest sounding pitch with the capo applied
    pub fn highest_pitch(&self) -> Option<u8> {
        self.strings.iter().max().map(|p| p.saturating_add(self.frets))
    }
}

impl Default for Tuning {
    fn default() -> Self {
        Self::standard_guitar()
    }
}

impl std::fmt::Display for Tuning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .strings
            .iter()
            .map(|p| crate::timeline::note::Note::new(*p, 0).note_name())
            .collect();
        write!(f, "{}", names.join(" "))?;
        if self.capo > 0 {
            write!(f, " (capo {})", self.capo)?;
        }
        Ok(())
    }
}
