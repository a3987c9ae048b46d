use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::key::KeyMode;
use crate::pitch::PitchType;
use crate::{Error, Result};

/// Chord quality. Declaration order is the one-hot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChordType {
    Major,
    Minor,
    Diminished,
    Augmented,
    MinMin7,
    MajMin7,
    MajMaj7,
    MinMaj7,
    Dim7,
    HalfDim7,
    AugMin7,
    AugMaj7,
}

impl ChordType {
    pub const ALL: [ChordType; 12] = [
        ChordType::Major,
        ChordType::Minor,
        ChordType::Diminished,
        ChordType::Augmented,
        ChordType::MinMin7,
        ChordType::MajMin7,
        ChordType::MajMaj7,
        ChordType::MinMaj7,
        ChordType::Dim7,
        ChordType::HalfDim7,
        ChordType::AugMin7,
        ChordType::AugMaj7,
    ];

    /// Short annotation string, e.g. `Mm7` for a dominant seventh.
    pub fn as_str(self) -> &'static str {
        match self {
            ChordType::Major => "M",
            ChordType::Minor => "m",
            ChordType::Diminished => "o",
            ChordType::Augmented => "+",
            ChordType::MinMin7 => "mm7",
            ChordType::MajMin7 => "Mm7",
            ChordType::MajMaj7 => "MM7",
            ChordType::MinMaj7 => "mM7",
            ChordType::Dim7 => "o7",
            ChordType::HalfDim7 => "%7",
            ChordType::AugMin7 => "+7",
            ChordType::AugMaj7 => "+M7",
        }
    }

    /// Chord tones above the root in semitones, in root-position stacking order.
    pub fn semitones(self) -> &'static [u8] {
        match self {
            ChordType::Major => &[0, 4, 7],
            ChordType::Minor => &[0, 3, 7],
            ChordType::Diminished => &[0, 3, 6],
            ChordType::Augmented => &[0, 4, 8],
            ChordType::MinMin7 => &[0, 3, 7, 10],
            ChordType::MajMin7 => &[0, 4, 7, 10],
            ChordType::MajMaj7 => &[0, 4, 7, 11],
            ChordType::MinMaj7 => &[0, 3, 7, 11],
            ChordType::Dim7 => &[0, 3, 6, 9],
            ChordType::HalfDim7 => &[0, 3, 6, 10],
            ChordType::AugMin7 => &[0, 4, 8, 10],
            ChordType::AugMaj7 => &[0, 4, 8, 11],
        }
    }

    /// Chord tones above the root measured in fifths (tonal pitch class intervals).
    pub fn fifths(self) -> &'static [i32] {
        match self {
            ChordType::Major => &[0, 4, 1],
            ChordType::Minor => &[0, -3, 1],
            ChordType::Diminished => &[0, -3, -6],
            ChordType::Augmented => &[0, 4, 8],
            ChordType::MinMin7 => &[0, -3, 1, -2],
            ChordType::MajMin7 => &[0, 4, 1, -2],
            ChordType::MajMaj7 => &[0, 4, 1, 5],
            ChordType::MinMaj7 => &[0, -3, 1, 5],
            ChordType::Dim7 => &[0, -3, -6, -9],
            ChordType::HalfDim7 => &[0, -3, -6, -2],
            ChordType::AugMin7 => &[0, 4, 8, -2],
            ChordType::AugMaj7 => &[0, 4, 8, 5],
        }
    }

    pub fn num_inversions(self) -> usize {
        self.semitones().len()
    }

    pub fn is_seventh(self) -> bool {
        self.num_inversions() == 4
    }

    /// Bit mask over the 12 pitch classes for this chord built on `root_pc`.
    pub fn pitch_class_mask(self, root_pc: u8) -> u16 {
        self.semitones()
            .iter()
            .fold(0u16, |mask, &interval| mask | 1 << ((root_pc + interval) % 12))
    }
}

impl std::fmt::Display for ChordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChordType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ChordType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::InvalidChordType(s.to_string()))
    }
}

/// Parse a figured-bass annotation into an inversion number.
pub fn inversion_from_figbass(figbass: &str) -> Result<u8> {
    match figbass.trim() {
        "" | "7" => Ok(0),
        "6" | "65" => Ok(1),
        "64" | "43" => Ok(2),
        "2" | "42" => Ok(3),
        other => Err(Error::InvalidFiguredBass(other.to_string())),
    }
}

/// Key a chord is applied to, relative to the local key (e.g. V/V).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelativeKey {
    /// Tonic as a pitch index whose reference pitch means "the local tonic".
    pub tonic: u8,
    pub mode: KeyMode,
}

/// A chord symbol. Equality and hashing are structural.
///
/// `root` is a pitch index in the vocabulary's pitch space. Whether it is
/// absolute (reference = C) or relative to a local tonic (reference = the
/// tonic) depends on where the label is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChordLabel {
    pub root: u8,
    pub chord_type: ChordType,
    #[serde(default)]
    pub inversion: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative: Option<RelativeKey>,
}

impl ChordLabel {
    pub fn new(root: u8, chord_type: ChordType) -> Self {
        Self {
            root,
            chord_type,
            inversion: 0,
            relative: None,
        }
    }

    pub fn with_inversion(mut self, inversion: u8) -> Self {
        self.inversion = inversion;
        self
    }

    pub fn with_relative(mut self, relative: RelativeKey) -> Self {
        self.relative = Some(relative);
        self
    }

    /// Drop the fields a vocabulary does not track.
    pub fn reduce(mut self, vocab: &ChordVocabulary) -> Self {
        if !vocab.use_inversions {
            self.inversion = 0;
        }
        if !vocab.use_relative {
            self.relative = None;
        }
        self
    }

    /// Same chord moved by `interval` in the given pitch space. The tonic of
    /// an applied key moves with the root.
    pub fn transposed(self, interval: i32, pitch_type: PitchType) -> Result<Self> {
        let relative = match self.relative {
            Some(rel) => Some(RelativeKey {
                tonic: pitch_type.transpose(rel.tonic, interval)?,
                mode: rel.mode,
            }),
            None => None,
        };
        Ok(Self {
            root: pitch_type.transpose(self.root, interval)?,
            relative,
            ..self
        })
    }

    /// Whether `other` repeats this chord under the given vocabulary.
    pub fn is_repeated(&self, other: &ChordLabel, vocab: &ChordVocabulary) -> bool {
        self.reduce(vocab) == other.reduce(vocab)
    }
}

/// Dense index space over chord labels.
///
/// Ordering is chord type (outermost), then root, then inversion, then
/// the relative-key block (innermost block index multiplies the base space).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChordVocabulary {
    pub pitch_type: PitchType,
    pub use_inversions: bool,
    pub use_relative: bool,
}

impl ChordVocabulary {
    pub fn new(pitch_type: PitchType, use_inversions: bool, use_relative: bool) -> Self {
        Self {
            pitch_type,
            use_inversions,
            use_relative,
        }
    }

    fn inversions_of(&self, chord_type: ChordType) -> usize {
        if self.use_inversions {
            chord_type.num_inversions()
        } else {
            1
        }
    }

    fn type_offset(&self, chord_type: ChordType) -> usize {
        let pitches = self.pitch_type.num_pitches();
        ChordType::ALL
            .iter()
            .take_while(|&&t| t != chord_type)
            .map(|&t| pitches * self.inversions_of(t))
            .sum()
    }

    fn base_len(&self) -> usize {
        let pitches = self.pitch_type.num_pitches();
        ChordType::ALL
            .iter()
            .map(|&t| pitches * self.inversions_of(t))
            .sum()
    }

    fn relative_blocks(&self) -> usize {
        if self.use_relative {
            1 + 2 * self.pitch_type.num_pitches()
        } else {
            1
        }
    }

    pub fn len(&self) -> usize {
        self.base_len() * self.relative_blocks()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn index_of(&self, label: &ChordLabel) -> Result<usize> {
        let pitches = self.pitch_type.num_pitches();
        let reject = |reason: String| Error::OutOfVocabulary {
            label: format!("{label:?}"),
            reason,
        };

        if label.root as usize >= pitches {
            return Err(reject(format!("root {} >= {}", label.root, pitches)));
        }
        let inversions = self.inversions_of(label.chord_type);
        if label.inversion as usize >= inversions {
            return Err(reject(format!(
                "inversion {} not tracked ({} allowed)",
                label.inversion, inversions
            )));
        }

        let base = self.type_offset(label.chord_type)
            + label.root as usize * inversions
            + label.inversion as usize;

        let block = match (label.relative, self.use_relative) {
            (None, _) => 0,
            (Some(_), false) => return Err(reject("relative chords not tracked".into())),
            (Some(rel), true) => {
                if rel.tonic as usize >= pitches {
                    return Err(reject(format!("relative tonic {} >= {}", rel.tonic, pitches)));
                }
                1 + rel.mode.index() * pitches + rel.tonic as usize
            }
        };

        Ok(block * self.base_len() + base)
    }

    pub fn label_at(&self, index: usize) -> Result<ChordLabel> {
        let size = self.len();
        if index >= size {
            return Err(Error::IndexOutOfRange { index, size });
        }

        let pitches = self.pitch_type.num_pitches();
        let base_len = self.base_len();
        let block = index / base_len;
        let mut base = index % base_len;

        let relative = if block == 0 {
            None
        } else {
            let rel = block - 1;
            Some(RelativeKey {
                tonic: (rel % pitches) as u8,
                mode: KeyMode::from_index(rel / pitches),
            })
        };

        for chord_type in ChordType::ALL {
            let inversions = self.inversions_of(chord_type);
            let span = pitches * inversions;
            if base < span {
                return Ok(ChordLabel {
                    root: (base / inversions) as u8,
                    chord_type,
                    inversion: (base % inversions) as u8,
                    relative,
                });
            }
            base -= span;
        }

        Err(Error::IndexOutOfRange { index, size })
    }

    /// Human-readable form, e.g. `G:Mm7`, `G:Mm7:1`, `D:M/G:major`.
    pub fn label_string(&self, label: &ChordLabel) -> String {
        let mut out = format!(
            "{}:{}",
            self.pitch_type.pitch_string(label.root),
            label.chord_type
        );
        if self.use_inversions {
            out.push_str(&format!(":{}", label.inversion));
        }
        if let (true, Some(rel)) = (self.use_relative, label.relative) {
            out.push_str(&format!("/{}:{}", self.pitch_type.pitch_string(rel.tonic), rel.mode));
        }
        out
    }

    pub fn index_string(&self, index: usize) -> Result<String> {
        Ok(self.label_string(&self.label_at(index)?))
    }

    /// Every label in one-hot order.
    pub fn labels(&self) -> impl Iterator<Item = ChordLabel> + '_ {
        (0..self.len()).filter_map(move |i| self.label_at(i).ok())
    }

    /// Move the root of the label at `index` by `interval`; `None` when the
    /// transposed root does not exist in this pitch space.
    pub fn transpose_index(&self, index: usize, interval: i32) -> Result<Option<usize>> {
        let label = self.label_at(index)?;
        match label.transposed(interval, self.pitch_type) {
            Ok(moved) => Ok(Some(self.index_of(&moved)?)),
            Err(Error::PitchOutOfRange { .. }) => Ok(None),
            Err(other) => Err(other),
        }
    }

    /// Re-express an absolute label index relative to a local tonic.
    pub fn to_key_relative(&self, index: usize, tonic: u8) -> Result<Option<usize>> {
        let interval = self.pitch_type.reference() as i32 - tonic as i32;
        self.transpose_index(index, interval)
    }

    /// Re-express a key-relative label index in absolute terms.
    pub fn to_absolute(&self, index: usize, tonic: u8) -> Result<Option<usize>> {
        let interval = tonic as i32 - self.pitch_type.reference() as i32;
        self.transpose_index(index, interval)
    }
}
