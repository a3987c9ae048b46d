use harmonic_core::{ChordRange, ChordVocabulary, Timeline};
use serde::{Deserialize, Serialize};

use super::templates::{template_score, Chroma, TemplateWeights};
use super::{check_distribution, log_softmax, uniform_log};
use crate::error::{DecodeError, Result, Submodel};

/// A stored classifier output for one range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeDistribution {
    pub range: ChordRange,
    pub log_probs: Vec<f64>,
}

/// Distribution over absolute chord labels for the frames of a range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChordClassifier {
    Uniform {
        vocab_len: usize,
    },
    /// Externally computed outputs. Ranges without an entry score uniformly.
    Precomputed {
        vocab_len: usize,
        ranges: Vec<RangeDistribution>,
    },
    /// Chroma matched against chord templates, softmaxed with `temperature`.
    Template {
        vocabulary: ChordVocabulary,
        #[serde(default = "default_temperature")]
        temperature: f64,
        #[serde(default = "default_bass_weight")]
        bass_weight: f64,
    },
}

fn default_temperature() -> f64 {
    0.1
}

fn default_bass_weight() -> f64 {
    TemplateWeights::default().bass_weight
}

impl ChordClassifier {
    pub fn template(vocabulary: ChordVocabulary) -> Self {
        ChordClassifier::Template {
            vocabulary,
            temperature: default_temperature(),
            bass_weight: default_bass_weight(),
        }
    }

    pub fn vocab_len(&self) -> usize {
        match self {
            ChordClassifier::Uniform { vocab_len } => *vocab_len,
            ChordClassifier::Precomputed { vocab_len, .. } => *vocab_len,
            ChordClassifier::Template { vocabulary, .. } => vocabulary.len(),
        }
    }

    pub fn score(&self, timeline: &Timeline, ranges: &[ChordRange]) -> Result<Vec<Vec<f64>>> {
        let len = self.vocab_len();
        ranges
            .iter()
            .enumerate()
            .map(|(batch_index, &range)| {
                if range.is_empty() || range.end > timeline.len() {
                    return Err(DecodeError::scoring(
                        Submodel::ChordClassifier,
                        batch_index,
                        format!("range {range} is not within {} frames", timeline.len()),
                    ));
                }
                let dist = match self {
                    ChordClassifier::Uniform { vocab_len } => uniform_log(*vocab_len),
                    ChordClassifier::Precomputed { vocab_len, ranges } => ranges
                        .iter()
                        .find(|r| r.range == range)
                        .map(|r| r.log_probs.clone())
                        .unwrap_or_else(|| uniform_log(*vocab_len)),
                    ChordClassifier::Template {
                        vocabulary,
                        temperature,
                        bass_weight,
                    } => {
                        if *temperature <= 0.0 {
                            return Err(DecodeError::scoring(
                                Submodel::ChordClassifier,
                                batch_index,
                                format!("temperature {temperature} must be positive"),
                            ));
                        }
                        let chroma = Chroma::from_frames(timeline.window(range));
                        let weights = TemplateWeights {
                            bass_weight: *bass_weight,
                            ..TemplateWeights::default()
                        };
                        let scores: Vec<f64> = vocabulary
                            .labels()
                            .map(|label| {
                                template_score(&label, vocabulary.pitch_type, &chroma, &weights)
                            })
                            .collect();
                        log_softmax(&scores, *temperature)
                    }
                };
                check_distribution(Submodel::ChordClassifier, batch_index, &dist, len)?;
                Ok(dist)
            })
            .collect()
    }
}
