use harmonic_core::KeyMode;
use serde::{Deserialize, Serialize};

use super::{check_distribution, log_normalize, uniform_log};
use crate::error::{DecodeError, Result, Submodel};

/// Prior over the key-relative label of a piece's first chord.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InitialChordPrior {
    Uniform { vocab_len: usize },
    /// Per-mode weights (counts or probabilities) indexed by chord label.
    Table { major: Vec<f64>, minor: Vec<f64> },
}

#[derive(Deserialize)]
struct CountsFile {
    major: Vec<f64>,
    minor: Vec<f64>,
}

impl InitialChordPrior {
    /// Build a table prior from a JSON object `{"major": [...], "minor": [...]}`.
    pub fn from_json_counts(json: &str) -> Result<Self> {
        let counts: CountsFile = serde_json::from_str(json)
            .map_err(|e| DecodeError::scoring(Submodel::InitialChord, 0, e.to_string()))?;
        if counts.major.len() != counts.minor.len() {
            return Err(DecodeError::scoring(
                Submodel::InitialChord,
                0,
                format!(
                    "major table has {} entries but minor has {}",
                    counts.major.len(),
                    counts.minor.len()
                ),
            ));
        }
        Ok(InitialChordPrior::Table {
            major: counts.major,
            minor: counts.minor,
        })
    }

    pub fn vocab_len(&self) -> usize {
        match self {
            InitialChordPrior::Uniform { vocab_len } => *vocab_len,
            InitialChordPrior::Table { major, .. } => major.len(),
        }
    }

    pub fn score(&self, modes: &[KeyMode]) -> Result<Vec<Vec<f64>>> {
        let len = self.vocab_len();
        modes
            .iter()
            .enumerate()
            .map(|(i, mode)| {
                let dist = match self {
                    InitialChordPrior::Uniform { vocab_len } => uniform_log(*vocab_len),
                    InitialChordPrior::Table { major, minor } => {
                        let weights = match mode {
                            KeyMode::Major => major,
                            KeyMode::Minor => minor,
                        };
                        log_normalize(weights, 0.0, Submodel::InitialChord, i)?
                    }
                };
                check_distribution(Submodel::InitialChord, i, &dist, len)?;
                Ok(dist)
            })
            .collect()
    }
}
