//! Vocabulary, path and logging settings.

use harmonic_core::{ChordVocabulary, KeyVocabulary, PitchType};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which label space the decoder works in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyConfig {
    #[serde(default = "VocabularyConfig::default_pitch_type")]
    pub pitch_type: PitchType,

    /// Distinguish chord inversions.
    #[serde(default = "VocabularyConfig::default_use_inversions")]
    pub use_inversions: bool,

    /// Track applied (secondary) chords relative to a temporary tonic.
    #[serde(default)]
    pub use_relative: bool,
}

impl VocabularyConfig {
    fn default_pitch_type() -> PitchType {
        PitchType::Midi
    }

    fn default_use_inversions() -> bool {
        true
    }

    pub fn chord_vocabulary(&self) -> ChordVocabulary {
        ChordVocabulary::new(self.pitch_type, self.use_inversions, self.use_relative)
    }

    pub fn key_vocabulary(&self) -> KeyVocabulary {
        KeyVocabulary::new(self.pitch_type)
    }

    pub fn fingerprint(&self) -> String {
        format!(
            "{}:inv={}:rel={}",
            self.pitch_type, self.use_inversions, self.use_relative
        )
    }
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        Self {
            pitch_type: Self::default_pitch_type(),
            use_inversions: Self::default_use_inversions(),
            use_relative: false,
        }
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// SQLite decode cache. Caching is off when unset.
    #[serde(default)]
    pub cache_db: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default `tracing` filter directive, overridden by `RUST_LOG`.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_defaults() {
        let vocab = VocabularyConfig::default();
        assert_eq!(vocab.pitch_type, PitchType::Midi);
        assert!(vocab.use_inversions);
        assert!(!vocab.use_relative);
        assert_eq!(vocab.key_vocabulary().len(), 24);
    }

    #[test]
    fn test_vocabulary_fingerprint_differs() {
        let a = VocabularyConfig::default();
        let b = VocabularyConfig {
            pitch_type: PitchType::Tpc,
            ..Default::default()
        };
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_logging_default() {
        assert_eq!(LoggingConfig::default().level, "info");
    }
}
