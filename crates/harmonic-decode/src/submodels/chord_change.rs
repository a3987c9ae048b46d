use harmonic_core::{ChordRange, OnsetLevel, Timeline};
use serde::{Deserialize, Serialize};

use super::check_probability;
use crate::error::{DecodeError, Result, Submodel};

/// Per-frame probability that a new chord starts at that frame.
///
/// Frame 0 always starts a chord and reports 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChordChangeDetector {
    /// Externally computed probabilities, one per frame of the piece.
    Precomputed { probs: Vec<f64> },
    /// Pitch-class-set change between neighbouring frames, weighted by
    /// metrical strength.
    Heuristic,
}

impl ChordChangeDetector {
    /// Score each window of the timeline. Output `i` has one probability
    /// per frame of `windows[i]`.
    pub fn score(&self, timeline: &Timeline, windows: &[ChordRange]) -> Result<Vec<Vec<f64>>> {
        windows
            .iter()
            .enumerate()
            .map(|(batch_index, &window)| {
                if window.end > timeline.len() {
                    return Err(DecodeError::scoring(
                        Submodel::ChordChange,
                        batch_index,
                        format!("window {window} exceeds {} frames", timeline.len()),
                    ));
                }
                let probs = match self {
                    ChordChangeDetector::Precomputed { probs } => {
                        if probs.len() != timeline.len() {
                            return Err(DecodeError::scoring(
                                Submodel::ChordChange,
                                batch_index,
                                format!(
                                    "{} probabilities for a {}-frame piece",
                                    probs.len(),
                                    timeline.len()
                                ),
                            ));
                        }
                        (window.start..window.end)
                            .map(|f| if f == 0 { 1.0 } else { probs[f] })
                            .collect::<Vec<_>>()
                    }
                    ChordChangeDetector::Heuristic => (window.start..window.end)
                        .map(|f| heuristic_change_prob(timeline, f))
                        .collect(),
                };
                for &p in &probs {
                    check_probability(Submodel::ChordChange, batch_index, p)?;
                }
                Ok(probs)
            })
            .collect()
    }
}

fn level_bonus(level: OnsetLevel) -> f64 {
    match level {
        OnsetLevel::Downbeat => 0.3,
        OnsetLevel::Beat => 0.15,
        OnsetLevel::SubBeat => 0.05,
        OnsetLevel::Lower => 0.0,
    }
}

fn heuristic_change_prob(timeline: &Timeline, frame: usize) -> f64 {
    let (Some(prev), Some(cur)) = (
        frame.checked_sub(1).and_then(|f| timeline.frame(f)),
        timeline.frame(frame),
    ) else {
        return 1.0;
    };

    let (a, b) = (prev.pitch_class_mask(), cur.pitch_class_mask());
    let union = (a | b).count_ones();
    // Silence continues whatever was sounding.
    let distance = if b == 0 || union == 0 {
        0.0
    } else {
        1.0 - (a & b).count_ones() as f64 / union as f64
    };

    let bass_moved = match (prev.bass_pitch_class(), cur.bass_pitch_class()) {
        (Some(x), Some(y)) if x != y => 0.1,
        _ => 0.0,
    };

    (0.6 * distance + level_bonus(cur.level) + bass_moved).clamp(0.0, 1.0)
}
