use serde::{Deserialize, Serialize};

use crate::pitch::PitchType;
use crate::{Error, Result};

/// MIDI pitch classes conventionally spelled with flats when naming keys.
const FLAT_ROOTS: [u8; 6] = [1, 3, 5, 6, 8, 10];
const NOTE_NAMES_SHARP: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];
const NOTE_NAMES_FLAT: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyMode {
    Major,
    Minor,
}

impl KeyMode {
    pub const ALL: [KeyMode; 2] = [KeyMode::Major, KeyMode::Minor];

    pub fn index(self) -> usize {
        match self {
            KeyMode::Major => 0,
            KeyMode::Minor => 1,
        }
    }

    /// Inverse of [`KeyMode::index`]; anything past the last mode is minor.
    pub fn from_index(index: usize) -> Self {
        if index == 0 {
            KeyMode::Major
        } else {
            KeyMode::Minor
        }
    }
}

impl std::fmt::Display for KeyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyMode::Major => write!(f, "major"),
            KeyMode::Minor => write!(f, "minor"),
        }
    }
}

/// A local key: tonic as an interval from the global reference (C) plus mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyLabel {
    pub tonic: u8,
    pub mode: KeyMode,
}

impl KeyLabel {
    pub fn new(tonic: u8, mode: KeyMode) -> Self {
        Self { tonic, mode }
    }
}

/// Dense index space over keys: mode-major, then tonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyVocabulary {
    pub pitch_type: PitchType,
}

impl KeyVocabulary {
    pub fn new(pitch_type: PitchType) -> Self {
        Self { pitch_type }
    }

    pub fn len(&self) -> usize {
        KeyMode::ALL.len() * self.pitch_type.num_pitches()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn index_of(&self, key: &KeyLabel) -> Result<usize> {
        let pitches = self.pitch_type.num_pitches();
        if key.tonic as usize >= pitches {
            return Err(Error::OutOfVocabulary {
                label: format!("{key:?}"),
                reason: format!("tonic {} >= {}", key.tonic, pitches),
            });
        }
        Ok(key.mode.index() * pitches + key.tonic as usize)
    }

    pub fn label_at(&self, index: usize) -> Result<KeyLabel> {
        let size = self.len();
        if index >= size {
            return Err(Error::IndexOutOfRange { index, size });
        }
        let pitches = self.pitch_type.num_pitches();
        Ok(KeyLabel {
            tonic: (index % pitches) as u8,
            mode: KeyMode::from_index(index / pitches),
        })
    }

    /// e.g. `Eb:major`.
    pub fn label_string(&self, key: &KeyLabel) -> String {
        format!("{}:{}", self.pitch_type.pitch_string(key.tonic), key.mode)
    }

    pub fn index_string(&self, index: usize) -> Result<String> {
        Ok(self.label_string(&self.label_at(index)?))
    }

    /// Compact key symbol, `Db` for D-flat major and `Dbm` for D-flat minor.
    ///
    /// MIDI tonics on black keys are spelled with flats.
    pub fn key_symbol(&self, key: &KeyLabel) -> String {
        let root = match self.pitch_type {
            PitchType::Midi => {
                let pc = key.tonic % 12;
                if FLAT_ROOTS.contains(&pc) {
                    NOTE_NAMES_FLAT[pc as usize].to_string()
                } else {
                    NOTE_NAMES_SHARP[pc as usize].to_string()
                }
            }
            PitchType::Tpc => self.pitch_type.pitch_string(key.tonic),
        };
        let suffix = match key.mode {
            KeyMode::Major => "",
            KeyMode::Minor => "m",
        };
        format!("{root}{suffix}")
    }

    pub fn labels(&self) -> impl Iterator<Item = KeyLabel> + '_ {
        (0..self.len()).filter_map(move |i| self.label_at(i).ok())
    }
}
