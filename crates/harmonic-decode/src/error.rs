use std::fmt;

use harmonic_conf::ConfigError;
use serde::{Deserialize, Serialize};

/// The six scoring components combined by the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Submodel {
    InitialChord,
    ChordChange,
    ChordClassifier,
    ChordSequence,
    KeyChange,
    KeySequence,
}

impl fmt::Display for Submodel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Submodel::InitialChord => "initial chord prior",
            Submodel::ChordChange => "chord change detector",
            Submodel::ChordClassifier => "chord classifier",
            Submodel::ChordSequence => "chord sequence model",
            Submodel::KeyChange => "key change detector",
            Submodel::KeySequence => "key sequence model",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("{submodel} failed on batch item {batch_index}: {reason}")]
    Scoring {
        submodel: Submodel,
        batch_index: usize,
        reason: String,
    },

    #[error("piece {piece}: no candidate extension at frame {frame}")]
    Exhausted { piece: String, frame: usize },

    #[error("piece {piece}: no chord annotations")]
    MissingAnnotations { piece: String },

    #[error("piece {piece}: consistency violation: {detail}")]
    Consistency { piece: String, detail: String },

    #[error("piece {piece}: stopped after {rounds} rounds")]
    RoundLimit { piece: String, rounds: usize },

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    #[error(transparent)]
    Core(#[from] harmonic_core::Error),
}

impl DecodeError {
    pub(crate) fn scoring(submodel: Submodel, batch_index: usize, reason: impl Into<String>) -> Self {
        DecodeError::Scoring {
            submodel,
            batch_index,
            reason: reason.into(),
        }
    }

    /// Whether this failure is confined to one piece, so a batch may skip it.
    pub fn is_per_piece(&self) -> bool {
        match self {
            DecodeError::Exhausted { .. }
            | DecodeError::RoundLimit { .. }
            | DecodeError::Scoring { .. }
            | DecodeError::MissingAnnotations { .. }
            | DecodeError::Core(_) => true,
            DecodeError::Consistency { .. } | DecodeError::InvalidConfig(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DecodeError>;
