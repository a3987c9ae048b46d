use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Index of C natural in the tonal pitch class (line of fifths) space.
pub const TPC_C: u8 = 15;

const MIDI_NAMES: [&str; 12] = [
    "C", "C#/Db", "D", "D#/Eb", "E", "F", "F#/Gb", "G", "G#/Ab", "A", "A#/Bb", "B",
];

/// Natural pitch letters ordered along the line of fifths.
const TPC_LETTERS: [char; 7] = ['F', 'C', 'G', 'D', 'A', 'E', 'B'];

const TPC_ACCIDENTALS: [&str; 5] = ["bb", "b", "", "#", "##"];

/// How pitches are represented in labels and vocabularies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PitchType {
    /// 12 enharmonically-collapsed pitch classes, C = 0.
    Midi,
    /// 35 tonal pitch classes from Fbb to B##, C = 15, one fifth = +1.
    Tpc,
}

impl std::fmt::Display for PitchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PitchType::Midi => write!(f, "midi"),
            PitchType::Tpc => write!(f, "tpc"),
        }
    }
}

impl PitchType {
    pub fn num_pitches(self) -> usize {
        match self {
            PitchType::Midi => 12,
            PitchType::Tpc => 35,
        }
    }

    /// The index of C, the global reference tonic.
    pub fn reference(self) -> u8 {
        match self {
            PitchType::Midi => 0,
            PitchType::Tpc => TPC_C,
        }
    }

    /// Index change produced by one sharp.
    pub fn accidental_adjustment(self) -> i32 {
        match self {
            PitchType::Midi => 1,
            PitchType::Tpc => 7,
        }
    }

    /// Transpose a pitch index by a signed interval in this representation.
    ///
    /// MIDI pitch classes wrap around the octave; tonal pitch classes have
    /// no wrap and fail when the result leaves Fbb..B##.
    pub fn transpose(self, pitch: u8, interval: i32) -> Result<u8> {
        match self {
            PitchType::Midi => Ok((pitch as i32 + interval).rem_euclid(12) as u8),
            PitchType::Tpc => {
                let shifted = pitch as i32 + interval;
                if (0..self.num_pitches() as i32).contains(&shifted) {
                    Ok(shifted as u8)
                } else {
                    Err(Error::PitchOutOfRange {
                        pitch: pitch as i32,
                        interval,
                        pitch_type: self,
                    })
                }
            }
        }
    }

    /// Pitch class (0-11) sounding for a pitch index.
    pub fn pitch_class(self, pitch: u8) -> u8 {
        match self {
            PitchType::Midi => pitch % 12,
            PitchType::Tpc => tpc_interval_to_midi_interval(pitch as i32 - TPC_C as i32),
        }
    }

    /// Printable name of a pitch index. Black keys in MIDI space print both
    /// spellings, e.g. `C#/Db`.
    pub fn pitch_string(self, pitch: u8) -> String {
        match self {
            PitchType::Midi => MIDI_NAMES[(pitch % 12) as usize].to_string(),
            PitchType::Tpc => {
                let letter = TPC_LETTERS[(pitch % 7) as usize];
                let accidental = TPC_ACCIDENTALS
                    .get((pitch / 7) as usize)
                    .copied()
                    .unwrap_or("");
                format!("{letter}{accidental}")
            }
        }
    }

    /// Parse a pitch name such as `C`, `F#`, `Bbb`.
    pub fn parse_pitch(self, name: &str) -> Result<u8> {
        let mut chars = name.chars();
        let letter = chars
            .next()
            .ok_or_else(|| Error::InvalidPitch(name.to_string()))?
            .to_ascii_uppercase();

        let (semitones, fifths) = match letter {
            'C' => (0, 0),
            'D' => (2, 2),
            'E' => (4, 4),
            'F' => (5, -1),
            'G' => (7, 1),
            'A' => (9, 3),
            'B' => (11, 5),
            _ => return Err(Error::InvalidPitch(name.to_string())),
        };

        let mut sharps = 0i32;
        for c in chars {
            match c {
                '#' => sharps += 1,
                'b' => sharps -= 1,
                _ => return Err(Error::InvalidPitch(name.to_string())),
            }
        }

        match self {
            PitchType::Midi => Ok((semitones + sharps).rem_euclid(12) as u8),
            PitchType::Tpc => {
                let index = TPC_C as i32 + fifths + sharps * self.accidental_adjustment();
                if (0..self.num_pitches() as i32).contains(&index) {
                    Ok(index as u8)
                } else {
                    Err(Error::InvalidPitch(name.to_string()))
                }
            }
        }
    }
}

/// Convert an interval measured in fifths to a semitone interval (0-11).
pub fn tpc_interval_to_midi_interval(interval: i32) -> u8 {
    (interval * 7).rem_euclid(12) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_naturals_and_accidentals() {
        let letters = ["C", "D", "E", "F", "G", "A", "B"];
        let semis: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];
        let fifths = [0, 2, 4, -1, 1, 3, 5];

        for (acc, adj) in [("###", 3), ("##", 2), ("#", 1), ("", 0), ("b", -1), ("bb", -2), ("bbb", -3)] {
            for i in 0..7 {
                let name = format!("{}{}", letters[i], acc);
                let midi = PitchType::Midi.parse_pitch(&name).unwrap();
                assert_eq!(midi as i32, (semis[i] + adj).rem_euclid(12), "{name}");

                let tpc = TPC_C as i32 + fifths[i] + adj * 7;
                match PitchType::Tpc.parse_pitch(&name) {
                    Ok(parsed) => assert_eq!(parsed as i32, tpc, "{name}"),
                    Err(_) => assert!(!(0..35).contains(&tpc), "{name} should parse"),
                }
            }
        }
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(PitchType::Midi.parse_pitch("").is_err());
        assert!(PitchType::Midi.parse_pitch("H").is_err());
        assert!(PitchType::Tpc.parse_pitch("C+").is_err());
    }

    #[test]
    fn tpc_strings_follow_line_of_fifths() {
        assert_eq!(PitchType::Tpc.pitch_string(0), "Fbb");
        assert_eq!(PitchType::Tpc.pitch_string(TPC_C), "C");
        assert_eq!(PitchType::Tpc.pitch_string(21), "F#");
        assert_eq!(PitchType::Tpc.pitch_string(34), "B##");
    }

    #[test]
    fn every_tpc_string_parses_back() {
        for pitch in 0..35u8 {
            let name = PitchType::Tpc.pitch_string(pitch);
            assert_eq!(PitchType::Tpc.parse_pitch(&name).unwrap(), pitch);
        }
    }

    #[test]
    fn midi_black_keys_print_both_spellings() {
        let name = PitchType::Midi.pitch_string(1);
        assert!(name.split('/').any(|s| s == "C#"));
        assert!(name.split('/').any(|s| s == "Db"));
        assert_eq!(PitchType::Midi.pitch_string(7), "G");
    }

    #[test]
    fn transpose_wraps_midi_only() {
        assert_eq!(PitchType::Midi.transpose(11, 2).unwrap(), 1);
        assert_eq!(PitchType::Midi.transpose(0, -1).unwrap(), 11);
        assert_eq!(PitchType::Tpc.transpose(TPC_C, 1).unwrap(), 16);
        assert!(PitchType::Tpc.transpose(34, 1).is_err());
        assert!(PitchType::Tpc.transpose(0, -1).is_err());
    }

    #[test]
    fn tpc_pitch_class_matches_midi_parse() {
        for pitch in 0..35u8 {
            let name = PitchType::Tpc.pitch_string(pitch);
            let midi = PitchType::Midi.parse_pitch(&name).unwrap();
            assert_eq!(PitchType::Tpc.pitch_class(pitch), midi, "{name}");
        }
    }
}
