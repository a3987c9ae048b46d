//! Per-piece decoding context: the piece, its change probabilities, and
//! caches shared by every hypothesis.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use harmonic_core::{ChordRange, ChordVocabulary, Piece};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DecodeError, Result};
use crate::observer::DecodeObserver;
use crate::proposer::oracle_change_probs;
use crate::submodels::SubmodelSet;

/// Where chord boundaries come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeSource {
    /// The chord change detector.
    #[default]
    Detected,
    /// The piece's annotated chord changes, for ablation.
    Oracle,
}

/// Built once per piece and threaded through one decode.
pub struct DecodeSession<'a> {
    piece: &'a Piece,
    source: RangeSource,
    change_probs: Vec<f64>,
    range_scores: HashMap<ChordRange, Vec<f64>>,
    absolute_maps: HashMap<u8, Vec<Option<usize>>>,
}

impl<'a> DecodeSession<'a> {
    pub fn new(
        piece: &'a Piece,
        models: &SubmodelSet,
        source: RangeSource,
        observer: &mut dyn DecodeObserver,
    ) -> Result<Self> {
        let frames = piece.timeline().len();
        let change_probs = match source {
            RangeSource::Detected => {
                let whole = ChordRange::new(0, frames)?;
                let mut scored = models.chord_change.score(piece.timeline(), &[whole])?;
                scored.pop().unwrap_or_default()
            }
            RangeSource::Oracle => {
                if !piece.is_annotated() {
                    return Err(DecodeError::MissingAnnotations {
                        piece: piece.id().to_string(),
                    });
                }
                oracle_change_probs(frames, piece.chord_change_indices())
            }
        };
        if change_probs.len() != frames {
            return Err(DecodeError::Consistency {
                piece: piece.id().to_string(),
                detail: format!(
                    "{} change probabilities for {frames} frames",
                    change_probs.len()
                ),
            });
        }

        observer.chord_change_probs(piece.id(), &change_probs);
        Ok(Self {
            piece,
            source,
            change_probs,
            range_scores: HashMap::new(),
            absolute_maps: HashMap::new(),
        })
    }

    pub fn piece(&self) -> &'a Piece {
        self.piece
    }

    pub fn source(&self) -> RangeSource {
        self.source
    }

    pub fn frames(&self) -> usize {
        self.change_probs.len()
    }

    pub fn change_probs(&self) -> &[f64] {
        &self.change_probs
    }

    /// Classify every range not scored yet, in one batch.
    pub fn score_ranges(
        &mut self,
        models: &SubmodelSet,
        ranges: &[ChordRange],
        observer: &mut dyn DecodeObserver,
    ) -> Result<()> {
        let mut missing: Vec<ChordRange> = ranges
            .iter()
            .copied()
            .filter(|r| !self.range_scores.contains_key(r))
            .collect();
        missing.sort();
        missing.dedup();
        if missing.is_empty() {
            return Ok(());
        }

        debug!(piece = self.piece.id(), count = missing.len(), "classifying ranges");
        let scored = models
            .chord_classifier
            .score(self.piece.timeline(), &missing)?;
        for (range, dist) in missing.into_iter().zip(scored) {
            observer.range_scored(self.piece.id(), range, &dist);
            self.range_scores.insert(range, dist);
        }
        Ok(())
    }

    /// Absolute classifier output for a range scored earlier.
    pub fn range_scores(&self, range: ChordRange) -> Option<&[f64]> {
        self.range_scores.get(&range).map(Vec::as_slice)
    }

    /// Build the key-relative to absolute label map for keys on `tonic`.
    pub fn prepare_tonic(&mut self, vocab: &ChordVocabulary, tonic: u8) -> Result<()> {
        if let Entry::Vacant(slot) = self.absolute_maps.entry(tonic) {
            let map = (0..vocab.len())
                .map(|rel| vocab.to_absolute(rel, tonic))
                .collect::<harmonic_core::Result<Vec<_>>>()?;
            slot.insert(map);
        }
        Ok(())
    }

    /// For each key-relative label, the absolute label it denotes in a key
    /// on `tonic`, or `None` when that label does not exist there.
    pub fn absolute_map(&self, tonic: u8) -> Option<&[Option<usize>]> {
        self.absolute_maps.get(&tonic).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{NoopObserver, RecordingObserver};
    use crate::submodels::{ChordChangeDetector, ChordClassifier};
    use harmonic_core::{Frame, KeyVocabulary, OnsetLevel, PitchType, Rational, Timeline};

    fn piece(frames: usize) -> Piece {
        let frames = (0..frames)
            .map(|i| {
                Frame::new(
                    Rational::new(i as i64, 4),
                    Rational::new(1, 4),
                    OnsetLevel::Beat,
                    vec![60, 64, 67],
                )
            })
            .collect();
        Piece::unannotated("session", Timeline::new(frames).unwrap())
    }

    fn models() -> SubmodelSet {
        let chords = ChordVocabulary::new(PitchType::Midi, false, false);
        let mut set = SubmodelSet::heuristic(&chords, &KeyVocabulary::new(PitchType::Midi));
        set.chord_change = ChordChangeDetector::Precomputed {
            probs: vec![0.0, 0.3, 0.8],
        };
        set.chord_classifier = ChordClassifier::Uniform { vocab_len: chords.len() };
        set
    }

    #[test]
    fn detected_probs_reported_to_observer() {
        let piece = piece(3);
        let mut observer = RecordingObserver::default();
        let session = DecodeSession::new(&piece, &models(), RangeSource::Detected, &mut observer).unwrap();
        assert_eq!(session.change_probs(), &[1.0, 0.3, 0.8]);
        assert_eq!(observer.chord_change_probs, vec![1.0, 0.3, 0.8]);
    }

    #[test]
    fn ranges_scored_once() {
        let piece = piece(3);
        let models = models();
        let mut observer = RecordingObserver::default();
        let mut session = DecodeSession::new(&piece, &models, RangeSource::Detected, &mut observer).unwrap();
        let a = ChordRange::new(0, 2).unwrap();
        let b = ChordRange::new(2, 3).unwrap();
        session.score_ranges(&models, &[a, b, a], &mut observer).unwrap();
        session.score_ranges(&models, &[b], &mut observer).unwrap();
        assert_eq!(observer.scored_ranges.len(), 2);
        assert!(session.range_scores(a).is_some());
    }

    #[test]
    fn oracle_needs_annotations() {
        let piece = piece(3);
        let result = DecodeSession::new(&piece, &models(), RangeSource::Oracle, &mut NoopObserver);
        let err = result.err().unwrap();
        assert!(matches!(err, DecodeError::MissingAnnotations { .. }));
        assert!(err.is_per_piece());
    }

    #[test]
    fn absolute_map_transposes() {
        let piece = piece(3);
        let vocab = ChordVocabulary::new(PitchType::Midi, false, false);
        let mut session = DecodeSession::new(&piece, &models(), RangeSource::Detected, &mut NoopObserver).unwrap();
        assert!(session.absolute_map(7).is_none());
        session.prepare_tonic(&vocab, 7).unwrap();
        // I in G is G major.
        assert_eq!(session.absolute_map(7).unwrap()[0], Some(7));
    }
}
