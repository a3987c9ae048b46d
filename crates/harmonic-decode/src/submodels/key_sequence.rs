use harmonic_core::{KeyLabel, KeyMode, KeyVocabulary, PitchType};
use serde::{Deserialize, Serialize};

use super::{check_distribution, log_normalize, log_softmax, uniform_log};
use crate::error::{DecodeError, Result, Submodel};

/// Distribution over the next key given the keys so far.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KeySequenceModel {
    Uniform {
        vocab_len: usize,
    },
    /// Favors keys close to the current one on the circle of fifths.
    /// Minor keys are placed at their relative major.
    Fifths {
        pitch_type: PitchType,
        decay: f64,
        mode_change_penalty: f64,
    },
    Bigram {
        initial: Vec<f64>,
        transitions: Vec<Vec<f64>>,
        #[serde(default)]
        smoothing: f64,
    },
}

impl KeySequenceModel {
    pub fn fifths(pitch_type: PitchType) -> Self {
        KeySequenceModel::Fifths {
            pitch_type,
            decay: 1.0,
            mode_change_penalty: 0.5,
        }
    }

    pub fn vocab_len(&self) -> usize {
        match self {
            KeySequenceModel::Uniform { vocab_len } => *vocab_len,
            KeySequenceModel::Fifths { pitch_type, .. } => KeyVocabulary::new(*pitch_type).len(),
            KeySequenceModel::Bigram { initial, .. } => initial.len(),
        }
    }

    /// Score one next-key distribution per key history (oldest first).
    pub fn score(&self, histories: &[&[usize]]) -> Result<Vec<Vec<f64>>> {
        let len = self.vocab_len();
        histories
            .iter()
            .enumerate()
            .map(|(batch_index, history)| {
                let dist = match self {
                    KeySequenceModel::Uniform { vocab_len } => uniform_log(*vocab_len),
                    KeySequenceModel::Fifths {
                        pitch_type,
                        decay,
                        mode_change_penalty,
                    } => match history.last() {
                        None => uniform_log(len),
                        Some(&current) => {
                            let vocab = KeyVocabulary::new(*pitch_type);
                            let from = vocab.label_at(current).map_err(|e| {
                                DecodeError::scoring(Submodel::KeySequence, batch_index, e.to_string())
                            })?;
                            let scores: Vec<f64> = vocab
                                .labels()
                                .map(|to| {
                                    let mut s = -decay * fifths_distance(*pitch_type, &from, &to) as f64;
                                    if to.mode != from.mode {
                                        s -= mode_change_penalty;
                                    }
                                    s
                                })
                                .collect();
                            log_softmax(&scores, 1.0)
                        }
                    },
                    KeySequenceModel::Bigram {
                        initial,
                        transitions,
                        smoothing,
                    } => {
                        let row = match history.last() {
                            None => initial,
                            Some(&prev) => transitions.get(prev).ok_or_else(|| {
                                DecodeError::scoring(
                                    Submodel::KeySequence,
                                    batch_index,
                                    format!("no transition row for key {prev}"),
                                )
                            })?,
                        };
                        log_normalize(row, *smoothing, Submodel::KeySequence, batch_index)?
                    }
                };
                check_distribution(Submodel::KeySequence, batch_index, &dist, len)?;
                Ok(dist)
            })
            .collect()
    }
}

/// Tonic of the major key sharing a signature with `key`.
fn signature_tonic(pitch_type: PitchType, key: &KeyLabel) -> i32 {
    let tonic = key.tonic as i32;
    match (key.mode, pitch_type) {
        (KeyMode::Major, _) => tonic,
        (KeyMode::Minor, PitchType::Midi) => (tonic + 3).rem_euclid(12),
        (KeyMode::Minor, PitchType::Tpc) => tonic - 3,
    }
}

/// Steps around the circle (or along the line) of fifths between signatures.
fn fifths_distance(pitch_type: PitchType, a: &KeyLabel, b: &KeyLabel) -> u32 {
    let diff = signature_tonic(pitch_type, b) - signature_tonic(pitch_type, a);
    match pitch_type {
        PitchType::Midi => {
            let fifths = (diff * 7).rem_euclid(12) as u32;
            fifths.min(12 - fifths)
        }
        PitchType::Tpc => diff.unsigned_abs(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submodels::top_k;

    #[test]
    fn fifths_distances() {
        let c = KeyLabel::new(0, KeyMode::Major);
        let g = KeyLabel::new(7, KeyMode::Major);
        let a_minor = KeyLabel::new(9, KeyMode::Minor);
        let f_sharp = KeyLabel::new(6, KeyMode::Major);
        assert_eq!(fifths_distance(PitchType::Midi, &c, &g), 1);
        assert_eq!(fifths_distance(PitchType::Midi, &c, &a_minor), 0);
        assert_eq!(fifths_distance(PitchType::Midi, &c, &f_sharp), 6);

        let tpc_c = KeyLabel::new(15, KeyMode::Major);
        let tpc_a_minor = KeyLabel::new(18, KeyMode::Minor);
        let tpc_f_sharp = KeyLabel::new(21, KeyMode::Major);
        assert_eq!(fifths_distance(PitchType::Tpc, &tpc_c, &tpc_a_minor), 0);
        assert_eq!(fifths_distance(PitchType::Tpc, &tpc_c, &tpc_f_sharp), 6);
    }

    #[test]
    fn fifths_model_prefers_neighbours() {
        let model = KeySequenceModel::fifths(PitchType::Midi);
        let vocab = KeyVocabulary::new(PitchType::Midi);
        let c = vocab.index_of(&KeyLabel::new(0, KeyMode::Major)).unwrap();
        let dist = model.score(&[&[c]]).unwrap().remove(0);

        let best = top_k(&dist, 4);
        assert_eq!(best[0], c);
        let g = vocab.index_of(&KeyLabel::new(7, KeyMode::Major)).unwrap();
        let f = vocab.index_of(&KeyLabel::new(5, KeyMode::Major)).unwrap();
        assert!(best.contains(&g) && best.contains(&f));
    }

    #[test]
    fn empty_history_is_uniform() {
        let model = KeySequenceModel::fifths(PitchType::Tpc);
        let dist = model.score(&[&[]]).unwrap().remove(0);
        assert_eq!(dist.len(), 70);
        assert!(dist.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn out_of_vocabulary_history() {
        let model = KeySequenceModel::fifths(PitchType::Midi);
        assert!(model.score(&[&[24]]).is_err());
    }
}
