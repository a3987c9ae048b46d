//! Beam-search decoder settings.

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Thresholds and bounds that steer the beam search.
///
/// Chord boundaries: a frame whose change probability is at least
/// `max_no_chord_change_prob` is always a boundary, a frame strictly below
/// `min_chord_change_prob` never is, and anything in between branches.
/// Key changes at chord boundaries follow the same scheme with the key
/// thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecoderConfig {
    #[serde(default = "DecoderConfig::default_min_chord_change_prob")]
    pub min_chord_change_prob: f64,

    #[serde(default = "DecoderConfig::default_max_no_chord_change_prob")]
    pub max_no_chord_change_prob: f64,

    /// States kept per frame position after pruning.
    #[serde(default = "DecoderConfig::default_beam_width")]
    pub beam_width: usize,

    /// Candidate ranges per state, and candidate labels per range.
    #[serde(default = "DecoderConfig::default_max_chord_branching_factor")]
    pub max_chord_branching_factor: usize,

    /// Candidate new keys per key change (and initial keys).
    #[serde(default = "DecoderConfig::default_max_key_branching_factor")]
    pub max_key_branching_factor: usize,

    #[serde(default = "DecoderConfig::default_min_key_change_prob")]
    pub min_key_change_prob: f64,

    #[serde(default = "DecoderConfig::default_max_no_key_change_prob")]
    pub max_no_key_change_prob: f64,

    /// Merge states sharing a key and their last `hash_length` chords.
    #[serde(default = "DecoderConfig::default_hash_length")]
    pub hash_length: Option<usize>,

    /// Abort a decode after this many rounds.
    #[serde(default)]
    pub max_rounds: Option<usize>,
}

impl DecoderConfig {
    fn default_min_chord_change_prob() -> f64 {
        0.25
    }

    fn default_max_no_chord_change_prob() -> f64 {
        0.45
    }

    fn default_beam_width() -> usize {
        50
    }

    fn default_max_chord_branching_factor() -> usize {
        5
    }

    fn default_max_key_branching_factor() -> usize {
        2
    }

    fn default_min_key_change_prob() -> f64 {
        0.05
    }

    fn default_max_no_key_change_prob() -> f64 {
        0.75
    }

    fn default_hash_length() -> Option<usize> {
        Some(5)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        for (name, value) in [
            ("min_chord_change_prob", self.min_chord_change_prob),
            ("max_no_chord_change_prob", self.max_no_chord_change_prob),
            ("min_key_change_prob", self.min_key_change_prob),
            ("max_no_key_change_prob", self.max_no_key_change_prob),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{name} = {value} is not a probability"));
            }
        }

        if self.min_chord_change_prob > self.max_no_chord_change_prob {
            return invalid(format!(
                "min_chord_change_prob ({}) exceeds max_no_chord_change_prob ({})",
                self.min_chord_change_prob, self.max_no_chord_change_prob
            ));
        }
        if self.min_key_change_prob > self.max_no_key_change_prob {
            return invalid(format!(
                "min_key_change_prob ({}) exceeds max_no_key_change_prob ({})",
                self.min_key_change_prob, self.max_no_key_change_prob
            ));
        }

        for (name, value) in [
            ("beam_width", self.beam_width),
            ("max_chord_branching_factor", self.max_chord_branching_factor),
            ("max_key_branching_factor", self.max_key_branching_factor),
        ] {
            if value == 0 {
                return invalid(format!("{name} must be at least 1"));
            }
        }

        if self.hash_length == Some(0) {
            return invalid("hash_length must be at least 1 when set".into());
        }
        if self.max_rounds == Some(0) {
            return invalid("max_rounds must be at least 1 when set".into());
        }

        Ok(())
    }

    /// Stable textual identity of every setting that affects decoding results.
    pub fn fingerprint(&self) -> String {
        format!(
            "cc[{};{}] kc[{};{}] beam={} cb={} kb={} hash={:?}",
            self.min_chord_change_prob,
            self.max_no_chord_change_prob,
            self.min_key_change_prob,
            self.max_no_key_change_prob,
            self.beam_width,
            self.max_chord_branching_factor,
            self.max_key_branching_factor,
            self.hash_length,
        )
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            min_chord_change_prob: Self::default_min_chord_change_prob(),
            max_no_chord_change_prob: Self::default_max_no_chord_change_prob(),
            beam_width: Self::default_beam_width(),
            max_chord_branching_factor: Self::default_max_chord_branching_factor(),
            max_key_branching_factor: Self::default_max_key_branching_factor(),
            min_key_change_prob: Self::default_min_key_change_prob(),
            max_no_key_change_prob: Self::default_max_no_key_change_prob(),
            hash_length: Self::default_hash_length(),
            max_rounds: None,
        }
    }
}
