//! Comparing decoded analyses against ground truth.

use std::collections::HashMap;

use harmonic_core::{ChordRange, ChordVocabulary, KeyVocabulary, Piece};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::analysis::DecodedAnalysis;
use crate::decoder::BeamSearchDecoder;
use crate::error::{DecodeError, Result};
use crate::observer::NoopObserver;
use crate::session::RangeSource;
use crate::submodels::SubmodelSet;

/// Counts for one piece. Ratios are derived on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceEvaluation {
    pub piece_id: String,
    pub frames: usize,
    pub true_ranges: usize,
    pub decoded_ranges: usize,
    /// Decoded ranges identical to a ground-truth range.
    pub matched_ranges: usize,
    /// Matched ranges that also carry the right chord.
    pub correct_labels: usize,
    pub correct_chord_frames: usize,
    pub correct_key_frames: usize,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl PieceEvaluation {
    pub fn range_recall(&self) -> f64 {
        ratio(self.matched_ranges, self.true_ranges)
    }

    pub fn range_precision(&self) -> f64 {
        ratio(self.matched_ranges, self.decoded_ranges)
    }

    /// Label accuracy within correctly found ranges.
    pub fn label_accuracy(&self) -> f64 {
        ratio(self.correct_labels, self.matched_ranges)
    }

    pub fn chord_frame_accuracy(&self) -> f64 {
        ratio(self.correct_chord_frames, self.frames)
    }

    pub fn key_frame_accuracy(&self) -> f64 {
        ratio(self.correct_key_frames, self.frames)
    }
}

/// Score one decoded analysis against the piece's annotations.
///
/// Chords are compared as absolute labels, so a right chord heard in the
/// wrong key still counts as right.
pub fn evaluate_piece(
    piece: &Piece,
    decoded: &DecodedAnalysis,
    chords: &ChordVocabulary,
    keys: &KeyVocabulary,
) -> Result<PieceEvaluation> {
    let consistency = |detail: String| DecodeError::Consistency {
        piece: piece.id().to_string(),
        detail,
    };
    if !piece.is_annotated() {
        return Err(DecodeError::MissingAnnotations {
            piece: piece.id().to_string(),
        });
    }
    let frames = piece.timeline().len();
    if decoded.piece_id != piece.id() {
        return Err(consistency(format!("analysis belongs to piece {}", decoded.piece_id)));
    }

    let mut truth: HashMap<ChordRange, Option<usize>> = HashMap::new();
    let mut true_chord_frames = Vec::with_capacity(frames);
    let mut true_key_frames = Vec::with_capacity(frames);
    for chord in piece.chords() {
        let relative = chords.index_of(&chord.label)?;
        let absolute = chords.to_absolute(relative, chord.key.tonic)?;
        let key = keys.index_of(&chord.key)?;
        truth.insert(chord.range, absolute);
        true_chord_frames.extend(std::iter::repeat(absolute).take(chord.range.len()));
        true_key_frames.extend(std::iter::repeat(key).take(chord.range.len()));
    }

    let decoded_chord_frames = decoded.frame_chords(chords, keys)?;
    let decoded_key_frames = decoded.frame_keys();
    if decoded_chord_frames.len() != frames || true_chord_frames.len() != frames {
        return Err(consistency(format!(
            "decoded {} frames and annotated {} frames for a {frames}-frame piece",
            decoded_chord_frames.len(),
            true_chord_frames.len()
        )));
    }

    let mut matched_ranges = 0;
    let mut correct_labels = 0;
    for chord in &decoded.chords {
        if let Some(expected) = truth.get(&chord.range) {
            matched_ranges += 1;
            let actual = DecodedAnalysis::absolute_label(chord, chords, keys)?;
            if actual.is_some() && actual == *expected {
                correct_labels += 1;
            }
        }
    }

    Ok(PieceEvaluation {
        piece_id: piece.id().to_string(),
        frames,
        true_ranges: piece.chords().len(),
        decoded_ranges: decoded.chords.len(),
        matched_ranges,
        correct_labels,
        correct_chord_frames: true_chord_frames
            .iter()
            .zip(&decoded_chord_frames)
            .filter(|(t, d)| t.is_some() && t == d)
            .count(),
        correct_key_frames: true_key_frames
            .iter()
            .zip(&decoded_key_frames)
            .filter(|(t, d)| t == d)
            .count(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedPiece {
    pub piece_id: String,
    pub error: String,
}

/// Micro-averaged results over a batch of pieces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub pieces: Vec<PieceEvaluation>,
    pub failed: Vec<FailedPiece>,
}

impl EvaluationSummary {
    fn total(&self, field: impl Fn(&PieceEvaluation) -> usize) -> usize {
        self.pieces.iter().map(field).sum()
    }

    pub fn range_recall(&self) -> f64 {
        ratio(self.total(|p| p.matched_ranges), self.total(|p| p.true_ranges))
    }

    pub fn range_precision(&self) -> f64 {
        ratio(self.total(|p| p.matched_ranges), self.total(|p| p.decoded_ranges))
    }

    pub fn label_accuracy(&self) -> f64 {
        ratio(self.total(|p| p.correct_labels), self.total(|p| p.matched_ranges))
    }

    pub fn chord_frame_accuracy(&self) -> f64 {
        ratio(self.total(|p| p.correct_chord_frames), self.total(|p| p.frames))
    }

    pub fn key_frame_accuracy(&self) -> f64 {
        ratio(self.total(|p| p.correct_key_frames), self.total(|p| p.frames))
    }
}

/// Decode and score every piece.
///
/// Failures confined to one piece, unannotated pieces included, are logged
/// and recorded. Consistency violations abort the batch.
pub fn evaluate_batch(
    decoder: &BeamSearchDecoder,
    models: &SubmodelSet,
    pieces: &[Piece],
    source: RangeSource,
) -> Result<EvaluationSummary> {
    let mut summary = EvaluationSummary::default();
    for piece in pieces {
        let result = if !piece.is_annotated() {
            Err(DecodeError::MissingAnnotations {
                piece: piece.id().to_string(),
            })
        } else {
            decoder.decode_with(piece, models, source, 1, &mut NoopObserver)
        }
        .and_then(|outcome| {
            let best = outcome.analyses.first().ok_or_else(|| DecodeError::Exhausted {
                piece: piece.id().to_string(),
                frame: piece.timeline().len(),
            })?;
            evaluate_piece(piece, best, decoder.chord_vocabulary(), decoder.key_vocabulary())
        });
        match result {
            Ok(evaluation) => summary.pieces.push(evaluation),
            Err(e) if e.is_per_piece() => {
                warn!(piece = piece.id(), error = %e, "skipping piece");
                summary.failed.push(FailedPiece {
                    piece_id: piece.id().to_string(),
                    error: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        pieces = summary.pieces.len(),
        failed = summary.failed.len(),
        range_recall = summary.range_recall(),
        label_accuracy = summary.label_accuracy(),
        "evaluation finished"
    );
    Ok(summary)
}
