//! Chroma evidence and chord-template fit.

use harmonic_core::{ChordLabel, Frame, PitchType};

/// Duration-weighted pitch-class profile of a span of frames.
#[derive(Debug, Clone, PartialEq)]
pub struct Chroma {
    pub weights: [f64; 12],
    pub bass: [f64; 12],
}

impl Chroma {
    pub fn from_frames(frames: &[Frame]) -> Self {
        let mut weights = [0.0; 12];
        let mut bass = [0.0; 12];
        for frame in frames {
            let w = frame.weight();
            let mask = frame.pitch_class_mask();
            for (pc, slot) in weights.iter_mut().enumerate() {
                if mask & (1 << pc) != 0 {
                    *slot += w;
                }
            }
            if let Some(pc) = frame.bass_pitch_class() {
                bass[pc as usize] += w;
            }
        }
        Self { weights, bass }
    }

    pub fn total(&self) -> f64 {
        self.weights.iter().sum()
    }

    fn bass_total(&self) -> f64 {
        self.bass.iter().sum()
    }
}

/// Scoring constants for template fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemplateWeights {
    pub extra_penalty: f64,
    pub complete_bonus: f64,
    pub bass_weight: f64,
    pub applied_penalty: f64,
}

impl Default for TemplateWeights {
    fn default() -> Self {
        Self {
            extra_penalty: 0.5,
            complete_bonus: 0.1,
            bass_weight: 0.3,
            applied_penalty: 1.0,
        }
    }
}

/// Score how well an absolute chord label explains the chroma.
///
/// The score is the share of sounding weight on chord tones minus a penalty
/// for weight outside the chord, with bonuses when every chord tone sounds
/// and when the bass matches the tone implied by the inversion.
pub fn template_score(
    label: &ChordLabel,
    pitch_type: PitchType,
    chroma: &Chroma,
    weights: &TemplateWeights,
) -> f64 {
    let total = chroma.total();
    if total <= 0.0 {
        return 0.0;
    }

    let root_pc = pitch_type.pitch_class(label.root);
    let mask = label.chord_type.pitch_class_mask(root_pc);

    let mut inside = 0.0;
    let mut present = 0;
    for pc in 0..12 {
        if mask & (1 << pc) != 0 {
            inside += chroma.weights[pc];
            if chroma.weights[pc] > 0.0 {
                present += 1;
            }
        }
    }
    let outside = total - inside;

    let mut score = inside / total - weights.extra_penalty * outside / total;
    if present == label.chord_type.num_inversions() {
        score += weights.complete_bonus;
    }

    let bass_total = chroma.bass_total();
    if bass_total > 0.0 {
        let intervals = label.chord_type.semitones();
        if let Some(&interval) = intervals.get(label.inversion as usize) {
            let bass_pc = ((root_pc + interval) % 12) as usize;
            score += weights.bass_weight * chroma.bass[bass_pc] / bass_total;
        }
    }

    if label.relative.is_some() {
        score -= weights.applied_penalty;
    }
    score
}
