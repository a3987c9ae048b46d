use serde::{Deserialize, Serialize};

use crate::chord::{inversion_from_figbass, ChordLabel, ChordType, ChordVocabulary, RelativeKey};
use crate::key::{KeyLabel, KeyMode};
use crate::range::{check_tiling, ChordRange};
use crate::timeline::{Frame, Timeline};
use crate::{Error, Result};

/// A key as written in an annotation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyRecord {
    /// Absolute tonic name, e.g. `Eb`.
    pub tonic: String,
    pub mode: KeyMode,
}

/// One annotated chord as produced by the corpus ingestion step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordRecord {
    /// Index of the frame at which the chord begins.
    pub start: usize,
    /// Absolute root name, e.g. `G`.
    pub root: String,
    /// Chord type string, e.g. `Mm7`.
    pub chord_type: String,
    #[serde(default)]
    pub figbass: String,
    /// Local key active during this chord.
    pub key: KeyRecord,
    /// Key this chord is applied to (secondary dominants and the like).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_to: Option<KeyRecord>,
}

/// Serialized form of a piece: frames plus ground-truth chord annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PieceRecord {
    pub id: String,
    pub frames: Vec<Frame>,
    #[serde(default)]
    pub chords: Vec<ChordRecord>,
}

/// A ground-truth chord: key-relative label over a frame range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedChord {
    pub label: ChordLabel,
    pub range: ChordRange,
    pub key: KeyLabel,
}

/// A ground-truth key, starting at the chord with index `start_chord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedKey {
    pub label: KeyLabel,
    pub start_chord: usize,
}

/// A piece with its timeline and (for evaluation) its ground-truth analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct Piece {
    id: String,
    timeline: Timeline,
    chords: Vec<AnnotatedChord>,
    keys: Vec<AnnotatedKey>,
    chord_changes: Vec<usize>,
    key_changes: Vec<usize>,
}

impl Piece {
    /// A piece with no annotations, for inference only.
    pub fn unannotated(id: impl Into<String>, timeline: Timeline) -> Self {
        Self {
            id: id.into(),
            timeline,
            chords: Vec::new(),
            keys: Vec::new(),
            chord_changes: Vec::new(),
            key_changes: Vec::new(),
        }
    }

    /// Build a validated piece from an annotation record.
    ///
    /// Immediately repeated chords (same reduced label in the same key) are
    /// merged into the first occurrence, and key changes are placed wherever
    /// a chord's local key differs from the previous chord's.
    pub fn from_record(record: PieceRecord, vocab: &ChordVocabulary) -> Result<Self> {
        let id = record.id;
        let malformed = |detail: String| Error::MalformedAnnotation {
            piece: id.clone(),
            detail,
        };

        if record.frames.is_empty() {
            return Err(Error::EmptyPiece {
                piece: id.clone(),
                what: "frames",
            });
        }
        if record.chords.is_empty() {
            return Err(Error::EmptyPiece {
                piece: id.clone(),
                what: "chords",
            });
        }

        let timeline = Timeline::new(record.frames).map_err(|e| malformed(e.to_string()))?;
        let frame_count = timeline.len();

        let mut parsed: Vec<(usize, ChordLabel, KeyLabel)> = Vec::with_capacity(record.chords.len());
        for (i, chord) in record.chords.iter().enumerate() {
            let (label, key) =
                parse_chord(chord, vocab).map_err(|e| malformed(format!("chord {i}: {e}")))?;

            if chord.start >= frame_count {
                return Err(malformed(format!(
                    "chord {i} starts at frame {} but the piece has {frame_count} frames",
                    chord.start
                )));
            }
            match parsed.last() {
                None if chord.start != 0 => {
                    return Err(malformed(format!(
                        "first chord starts at frame {} instead of 0",
                        chord.start
                    )));
                }
                Some(&(prev_start, _, _)) if chord.start <= prev_start => {
                    return Err(malformed(format!(
                        "chord {i} starts at frame {} which does not follow frame {prev_start}",
                        chord.start
                    )));
                }
                _ => {}
            }

            let repeated = parsed
                .last()
                .is_some_and(|&(_, prev_label, prev_key)| {
                    prev_key == key && label.is_repeated(&prev_label, vocab)
                });
            if !repeated {
                parsed.push((chord.start, label, key));
            }
        }

        let mut chords = Vec::with_capacity(parsed.len());
        let mut keys: Vec<AnnotatedKey> = Vec::new();
        for (i, &(start, label, key)) in parsed.iter().enumerate() {
            let end = parsed.get(i + 1).map_or(frame_count, |next| next.0);
            chords.push(AnnotatedChord {
                label,
                range: ChordRange::new(start, end)?,
                key,
            });
            if keys.last().map_or(true, |k| k.label != key) {
                keys.push(AnnotatedKey {
                    label: key,
                    start_chord: i,
                });
            }
        }

        let piece = Self {
            chord_changes: chords.iter().map(|c| c.range.start).collect(),
            key_changes: keys.iter().map(|k| k.start_chord).collect(),
            id,
            timeline,
            chords,
            keys,
        };
        piece.check_consistency()?;
        Ok(piece)
    }

    /// Ground-truth ranges must tile the timeline.
    pub fn check_consistency(&self) -> Result<()> {
        if self.chords.is_empty() {
            return Ok(());
        }
        check_tiling(&self.chord_ranges(), self.timeline.len())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn is_annotated(&self) -> bool {
        !self.chords.is_empty()
    }

    pub fn chords(&self) -> &[AnnotatedChord] {
        &self.chords
    }

    pub fn keys(&self) -> &[AnnotatedKey] {
        &self.keys
    }

    /// Frame indices at which each ground-truth chord begins.
    pub fn chord_change_indices(&self) -> &[usize] {
        &self.chord_changes
    }

    pub fn chord_ranges(&self) -> Vec<ChordRange> {
        self.chords.iter().map(|c| c.range).collect()
    }

    /// Chord indices at which each ground-truth key begins.
    pub fn key_change_indices(&self) -> &[usize] {
        &self.key_changes
    }

    /// Frame indices at which each ground-truth key begins.
    pub fn key_change_input_indices(&self) -> Vec<usize> {
        self.key_changes
            .iter()
            .map(|&i| self.chord_changes[i])
            .collect()
    }

    /// Chords sounding between frames `start` (inclusive) and `stop` (exclusive).
    ///
    /// The first chord returned is the one sounding at `start`, even if it
    /// began earlier. With `stop = None` every chord to the end is returned.
    pub fn chords_within_range(&self, start: usize, stop: Option<usize>) -> Result<&[AnnotatedChord]> {
        if let Some(stop) = stop {
            if stop < start {
                return Err(Error::InvalidRange { start, end: stop });
            }
        }

        let mut first = self.chord_changes.partition_point(|&c| c < start);
        if first == self.chord_changes.len() || self.chord_changes[first] != start {
            first = first.saturating_sub(1);
        }

        match stop {
            None => Ok(&self.chords[first..]),
            Some(stop) => {
                let last = first + self.chord_changes[first..].partition_point(|&c| c < stop);
                Ok(&self.chords[first..last.max(first)])
            }
        }
    }
}

fn parse_key(record: &KeyRecord, vocab: &ChordVocabulary) -> Result<KeyLabel> {
    Ok(KeyLabel::new(
        vocab.pitch_type.parse_pitch(&record.tonic)?,
        record.mode,
    ))
}

fn parse_chord(record: &ChordRecord, vocab: &ChordVocabulary) -> Result<(ChordLabel, KeyLabel)> {
    let pitch_type = vocab.pitch_type;
    let key = parse_key(&record.key, vocab)?;
    let to_local = pitch_type.reference() as i32 - key.tonic as i32;

    let absolute_root = pitch_type.parse_pitch(&record.root)?;
    let chord_type: ChordType = record.chord_type.parse()?;
    let mut label = ChordLabel::new(pitch_type.transpose(absolute_root, to_local)?, chord_type)
        .with_inversion(inversion_from_figbass(&record.figbass)?);

    if let Some(applied) = &record.applied_to {
        let applied_key = parse_key(applied, vocab)?;
        label = label.with_relative(RelativeKey {
            tonic: pitch_type.transpose(applied_key.tonic, to_local)?,
            mode: applied_key.mode,
        });
    }

    let label = label.reduce(vocab);
    vocab.index_of(&label)?;
    Ok((label, key))
}
