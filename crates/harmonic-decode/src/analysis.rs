//! Decoded key and chord sequences and their human-readable forms.

use harmonic_core::{check_tiling, ChordRange, ChordVocabulary, KeyVocabulary};
use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, Result};
use crate::state::{StateArena, StateId, Transition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedChord {
    /// Key-relative chord label index.
    pub label: usize,
    pub range: ChordRange,
    /// Key index in force during this chord.
    pub key: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedKey {
    pub label: usize,
    /// Frame at which this key begins.
    pub start: usize,
}

/// One complete analysis of a piece.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedAnalysis {
    pub piece_id: String,
    pub chords: Vec<DecodedChord>,
    pub keys: Vec<DecodedKey>,
    pub log_prob: f64,
}

impl DecodedAnalysis {
    /// Trace a final state back to the root.
    ///
    /// Fails if the chords do not tile `[0, frames)`.
    pub fn from_state(arena: &StateArena, id: StateId, piece_id: &str, frames: usize) -> Result<Self> {
        let mut chords = Vec::new();
        let mut keys = Vec::new();
        for state in arena.lineage(id) {
            match state.transition {
                Transition::Root | Transition::KeyChange => keys.push(DecodedKey {
                    label: state.key,
                    start: state.end,
                }),
                Transition::Chord { label, range } => chords.push(DecodedChord {
                    label,
                    range,
                    key: state.key,
                }),
            }
        }

        let analysis = Self {
            piece_id: piece_id.to_string(),
            chords,
            keys,
            log_prob: arena.get(id).log_prob,
        };
        check_tiling(&analysis.chord_ranges(), frames).map_err(|e| DecodeError::Consistency {
            piece: piece_id.to_string(),
            detail: e.to_string(),
        })?;
        Ok(analysis)
    }

    pub fn chord_ranges(&self) -> Vec<ChordRange> {
        self.chords.iter().map(|c| c.range).collect()
    }

    /// Absolute chord label index of `chord`, if it exists in absolute terms.
    pub fn absolute_label(
        chord: &DecodedChord,
        chords: &ChordVocabulary,
        keys: &KeyVocabulary,
    ) -> Result<Option<usize>> {
        let tonic = keys.label_at(chord.key)?.tonic;
        Ok(chords.to_absolute(chord.label, tonic)?)
    }

    /// Absolute chord label for every frame.
    pub fn frame_chords(&self, chords: &ChordVocabulary, keys: &KeyVocabulary) -> Result<Vec<Option<usize>>> {
        let mut out = Vec::new();
        for chord in &self.chords {
            let absolute = Self::absolute_label(chord, chords, keys)?;
            out.extend(std::iter::repeat(absolute).take(chord.range.len()));
        }
        Ok(out)
    }

    /// Key index for every frame.
    pub fn frame_keys(&self) -> Vec<usize> {
        self.chords
            .iter()
            .flat_map(|c| std::iter::repeat(c.key).take(c.range.len()))
            .collect()
    }

    pub fn resolve(&self, chords: &ChordVocabulary, keys: &KeyVocabulary) -> Result<ResolvedAnalysis> {
        let resolved_chords = self
            .chords
            .iter()
            .map(|chord| {
                let absolute = match Self::absolute_label(chord, chords, keys)? {
                    Some(index) => Some(chords.index_string(index)?),
                    None => None,
                };
                Ok(ResolvedChord {
                    start: chord.range.start,
                    end: chord.range.end,
                    label: chords.index_string(chord.label)?,
                    absolute,
                    key: keys.index_string(chord.key)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let resolved_keys = self
            .keys
            .iter()
            .map(|key| {
                Ok(ResolvedKey {
                    start: key.start,
                    label: keys.index_string(key.label)?,
                    symbol: keys.key_symbol(&keys.label_at(key.label)?),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ResolvedAnalysis {
            piece_id: self.piece_id.clone(),
            log_prob: self.log_prob,
            keys: resolved_keys,
            chords: resolved_chords,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedChord {
    pub start: usize,
    pub end: usize,
    /// Key-relative label, e.g. `G:Mm7` meaning a dominant seventh on the fifth degree.
    pub label: String,
    /// The same chord spelled from C.
    pub absolute: Option<String>,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedKey {
    pub start: usize,
    pub label: String,
    pub symbol: String,
}

/// Decoded analysis with every index replaced by its label string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedAnalysis {
    pub piece_id: String,
    pub log_prob: f64,
    pub keys: Vec<ResolvedKey>,
    pub chords: Vec<ResolvedChord>,
}
