//! Scoring components consumed by the decoder.
//!
//! Each component is a closed enum of implementations, tagged by `kind` in
//! JSON. Every `score` call takes a batch and returns one result per batch
//! member; members never influence one another, so scoring a batch equals
//! scoring its members one at a time.

pub mod chord_change;
pub mod chord_classifier;
pub mod chord_sequence;
pub mod initial_chord;
pub mod key_change;
pub mod key_sequence;
pub mod templates;

pub use chord_change::ChordChangeDetector;
pub use chord_classifier::{ChordClassifier, RangeDistribution};
pub use chord_sequence::ChordSequenceModel;
pub use initial_chord::InitialChordPrior;
pub use key_change::{KeyChangeContext, KeyChangeDetector};
pub use key_sequence::KeySequenceModel;

use harmonic_core::{ChordVocabulary, KeyVocabulary};
use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, Result, Submodel};

/// Log-probabilities this far above zero are rounding noise.
pub(crate) const LOG_PROB_TOLERANCE: f64 = 1e-9;

/// The full set of frozen submodels for one decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmodelSet {
    pub initial_chord: InitialChordPrior,
    pub chord_change: ChordChangeDetector,
    pub chord_classifier: ChordClassifier,
    pub chord_sequence: ChordSequenceModel,
    pub key_change: KeyChangeDetector,
    pub key_sequence: KeySequenceModel,
}

impl SubmodelSet {
    /// Uninformative models over the given vocabularies, with pitch-based
    /// chord change detection and template chord classification.
    pub fn heuristic(chords: &ChordVocabulary, keys: &KeyVocabulary) -> Self {
        Self {
            initial_chord: InitialChordPrior::Uniform {
                vocab_len: chords.len(),
            },
            chord_change: ChordChangeDetector::Heuristic,
            chord_classifier: ChordClassifier::template(*chords),
            chord_sequence: ChordSequenceModel::Uniform {
                vocab_len: chords.len(),
            },
            key_change: KeyChangeDetector::Constant { prob: 0.1 },
            key_sequence: KeySequenceModel::fifths(keys.pitch_type),
        }
    }

    /// Check that every component agrees with the decoder's vocabularies.
    pub fn check_vocabularies(&self, chords: &ChordVocabulary, keys: &KeyVocabulary) -> Result<()> {
        let checks = [
            (Submodel::InitialChord, self.initial_chord.vocab_len(), chords.len()),
            (Submodel::ChordClassifier, self.chord_classifier.vocab_len(), chords.len()),
            (Submodel::ChordSequence, self.chord_sequence.vocab_len(), chords.len()),
            (Submodel::KeySequence, self.key_sequence.vocab_len(), keys.len()),
        ];
        for (submodel, actual, expected) in checks {
            if actual != expected {
                return Err(DecodeError::scoring(
                    submodel,
                    0,
                    format!("built for {actual} labels but the vocabulary has {expected}"),
                ));
            }
        }
        Ok(())
    }
}

/// Validate one log-probability distribution.
pub(crate) fn check_distribution(
    submodel: Submodel,
    batch_index: usize,
    dist: &[f64],
    expected_len: usize,
) -> Result<()> {
    if dist.len() != expected_len {
        return Err(DecodeError::scoring(
            submodel,
            batch_index,
            format!("expected {expected_len} scores, got {}", dist.len()),
        ));
    }
    if let Some((i, v)) = dist
        .iter()
        .enumerate()
        .find(|(_, v)| v.is_nan() || **v > LOG_PROB_TOLERANCE)
    {
        return Err(DecodeError::scoring(
            submodel,
            batch_index,
            format!("label {i} has invalid log-probability {v}"),
        ));
    }
    Ok(())
}

pub(crate) fn check_probability(submodel: Submodel, batch_index: usize, p: f64) -> Result<()> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(DecodeError::scoring(
            submodel,
            batch_index,
            format!("probability {p} outside [0, 1]"),
        ))
    }
}

pub(crate) fn uniform_log(len: usize) -> Vec<f64> {
    vec![-(len as f64).ln(); len]
}

/// Normalize non-negative weights (counts or probabilities) into
/// log-probabilities, adding `smoothing` to every weight first.
pub(crate) fn log_normalize(
    weights: &[f64],
    smoothing: f64,
    submodel: Submodel,
    batch_index: usize,
) -> Result<Vec<f64>> {
    if let Some(w) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(DecodeError::scoring(
            submodel,
            batch_index,
            format!("weight {w} is not a non-negative number"),
        ));
    }
    let total: f64 = weights.iter().map(|w| w + smoothing).sum();
    if total <= 0.0 {
        return Err(DecodeError::scoring(submodel, batch_index, "weights sum to zero"));
    }
    Ok(weights
        .iter()
        .map(|w| ((w + smoothing) / total).ln())
        .collect())
}

/// Log-softmax of raw scores divided by `temperature`.
pub(crate) fn log_softmax(scores: &[f64], temperature: f64) -> Vec<f64> {
    let scaled: Vec<f64> = scores.iter().map(|s| s / temperature).collect();
    let max = scaled.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return uniform_log(scores.len());
    }
    let log_sum = scaled.iter().map(|s| (s - max).exp()).sum::<f64>().ln() + max;
    scaled.iter().map(|s| (s - log_sum).min(0.0)).collect()
}

/// Indices of the `k` largest finite scores, best first, ties to the lower index.
pub(crate) fn top_k(scores: &[f64], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len())
        .filter(|&i| scores[i] > f64::NEG_INFINITY)
        .collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
    order.truncate(k);
    order
}
