use serde::{Deserialize, Serialize};

use super::{check_distribution, log_normalize, uniform_log};
use crate::error::{DecodeError, Result, Submodel};

/// Prior over the next key-relative chord given the chords so far in the
/// current key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChordSequenceModel {
    Uniform {
        vocab_len: usize,
    },
    /// First-order transition weights. `initial` scores the first chord
    /// after a key change; `transitions[a][b]` weighs `a` followed by `b`.
    Bigram {
        initial: Vec<f64>,
        transitions: Vec<Vec<f64>>,
        #[serde(default)]
        smoothing: f64,
    },
}

impl ChordSequenceModel {
    pub fn vocab_len(&self) -> usize {
        match self {
            ChordSequenceModel::Uniform { vocab_len } => *vocab_len,
            ChordSequenceModel::Bigram { initial, .. } => initial.len(),
        }
    }

    /// Score one next-chord distribution per history.
    pub fn score(&self, histories: &[&[usize]]) -> Result<Vec<Vec<f64>>> {
        let len = self.vocab_len();
        histories
            .iter()
            .enumerate()
            .map(|(batch_index, history)| {
                let dist = match self {
                    ChordSequenceModel::Uniform { vocab_len } => uniform_log(*vocab_len),
                    ChordSequenceModel::Bigram {
                        initial,
                        transitions,
                        smoothing,
                    } => {
                        let row = match history.last() {
                            None => initial,
                            Some(&prev) => transitions.get(prev).ok_or_else(|| {
                                DecodeError::scoring(
                                    Submodel::ChordSequence,
                                    batch_index,
                                    format!("no transition row for chord {prev}"),
                                )
                            })?,
                        };
                        log_normalize(row, *smoothing, Submodel::ChordSequence, batch_index)?
                    }
                };
                check_distribution(Submodel::ChordSequence, batch_index, &dist, len)?;
                Ok(dist)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bigram() -> ChordSequenceModel {
        ChordSequenceModel::Bigram {
            initial: vec![1.0, 1.0, 0.0],
            transitions: vec![vec![0.0, 3.0, 1.0], vec![1.0, 0.0, 0.0], vec![2.0]],
            smoothing: 0.0,
        }
    }

    #[test]
    fn conditions_on_last_chord() {
        let model = bigram();
        let scored = model.score(&[&[], &[1, 0]]).unwrap();
        assert!((scored[0][0] - 0.5f64.ln()).abs() < 1e-12);
        assert_eq!(scored[0][2], f64::NEG_INFINITY);
        assert!((scored[1][1] - 0.75f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn ragged_row_is_shape_error() {
        let err = bigram().score(&[&[0], &[2]]).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Scoring {
                submodel: Submodel::ChordSequence,
                batch_index: 1,
                ..
            }
        ));
    }

    #[test]
    fn unknown_history_label() {
        assert!(bigram().score(&[&[7]]).is_err());
    }
}
