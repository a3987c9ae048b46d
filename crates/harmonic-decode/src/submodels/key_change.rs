use serde::{Deserialize, Serialize};

use super::check_probability;
use crate::error::{Result, Submodel};

/// A hypothesis at a chord boundary, as seen by the key change detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyChangeContext {
    /// Frame at which the next chord would start.
    pub frame: usize,
    /// Current key index.
    pub key: usize,
    /// Chords decoded since the last key change.
    pub chords_in_key: usize,
}

/// Probability that the key changes at a chord boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KeyChangeDetector {
    Constant {
        prob: f64,
    },
    /// Per-frame probabilities; frames past the end use `default`.
    Precomputed {
        probs: Vec<f64>,
        #[serde(default)]
        default: f64,
    },
}

impl KeyChangeDetector {
    pub fn score(&self, contexts: &[KeyChangeContext]) -> Result<Vec<f64>> {
        contexts
            .iter()
            .enumerate()
            .map(|(batch_index, context)| {
                let p = match self {
                    KeyChangeDetector::Constant { prob } => *prob,
                    KeyChangeDetector::Precomputed { probs, default } => {
                        probs.get(context.frame).copied().unwrap_or(*default)
                    }
                };
                check_probability(Submodel::KeyChange, batch_index, p)?;
                Ok(p)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(frame: usize) -> KeyChangeContext {
        KeyChangeContext {
            frame,
            key: 0,
            chords_in_key: 1,
        }
    }

    #[test]
    fn precomputed_lookup_and_default() {
        let detector = KeyChangeDetector::Precomputed {
            probs: vec![0.0, 0.9],
            default: 0.2,
        };
        assert_eq!(detector.score(&[ctx(1), ctx(5)]).unwrap(), vec![0.9, 0.2]);
    }

    #[test]
    fn out_of_range_probability() {
        let detector = KeyChangeDetector::Constant { prob: 1.5 };
        assert!(detector.score(&[ctx(1)]).is_err());
        assert!(detector.score(&[]).unwrap().is_empty());
    }
}
