//! Candidate chord ranges from per-frame change probabilities.

use harmonic_conf::DecoderConfig;
use harmonic_core::ChordRange;
use serde::Serialize;

/// A candidate next range with the log-probability of its segmentation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RangeCandidate {
    pub range: ChordRange,
    pub log_prob: f64,
}

/// A full segmentation of `[0, N)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segmentation {
    pub ranges: Vec<ChordRange>,
    pub log_prob: f64,
}

/// Frame classification under the change thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Forced,
    Ambiguous,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeProposer {
    min_change_prob: f64,
    max_no_change_prob: f64,
    max_candidates: usize,
}

impl RangeProposer {
    pub fn new(min_change_prob: f64, max_no_change_prob: f64, max_candidates: usize) -> Self {
        Self {
            min_change_prob,
            max_no_change_prob,
            max_candidates,
        }
    }

    pub fn from_config(config: &DecoderConfig) -> Self {
        Self::new(
            config.min_chord_change_prob,
            config.max_no_chord_change_prob,
            config.max_chord_branching_factor,
        )
    }

    /// The forced check comes first, so a frame exactly at
    /// `max_no_change_prob` is always a boundary.
    pub fn classify(&self, p: f64) -> Boundary {
        if p >= self.max_no_change_prob {
            Boundary::Forced
        } else if p < self.min_change_prob {
            Boundary::Never
        } else {
            Boundary::Ambiguous
        }
    }

    /// Ranges that may follow a boundary at `start`, best first.
    ///
    /// Scanning stops at the first forced boundary or at the end of the
    /// piece. A range ending at frame `e < N` pays `ln p[e]`; every frame it
    /// covers after its start pays `ln(1 - p)`. At most `max_candidates`
    /// ranges are returned, ties resolved toward the shorter range.
    pub fn next_ranges(&self, probs: &[f64], start: usize) -> Vec<RangeCandidate> {
        let n = probs.len();
        let mut candidates = Vec::new();
        if start >= n {
            return candidates;
        }

        let mut stay = 0.0;
        let mut end = start + 1;
        loop {
            if end == n {
                candidates.push(candidate(start, end, stay));
                break;
            }
            let p = probs[end];
            match self.classify(p) {
                Boundary::Forced => {
                    candidates.push(candidate(start, end, stay + p.ln()));
                    break;
                }
                Boundary::Ambiguous => {
                    candidates.push(candidate(start, end, stay + p.ln()));
                    stay += (1.0 - p).ln();
                }
                Boundary::Never => {
                    stay += (1.0 - p).ln();
                }
            }
            end += 1;
        }

        candidates.sort_by(|a, b| {
            b.log_prob
                .total_cmp(&a.log_prob)
                .then(a.range.end.cmp(&b.range.end))
        });
        candidates.truncate(self.max_candidates);
        candidates
    }

    /// Every segmentation reachable through `next_ranges`, best first.
    ///
    /// Exponential in the number of ambiguous frames; intended for short
    /// pieces and diagnostics.
    pub fn segmentations(&self, probs: &[f64]) -> Vec<Segmentation> {
        let mut out = Vec::new();
        let mut stack = vec![(0usize, Vec::new(), 0.0f64)];
        while let Some((start, ranges, log_prob)) = stack.pop() {
            if start == probs.len() {
                out.push(Segmentation { ranges, log_prob });
                continue;
            }
            for next in self.next_ranges(probs, start) {
                let mut extended = ranges.clone();
                extended.push(next.range);
                stack.push((next.range.end, extended, log_prob + next.log_prob));
            }
        }
        out.sort_by(|a, b| {
            b.log_prob
                .total_cmp(&a.log_prob)
                .then_with(|| a.ranges.cmp(&b.ranges))
        });
        out
    }
}

/// Change probabilities implied by known boundaries: 1.0 at each boundary
/// frame (and frame 0), 0.0 elsewhere.
pub fn oracle_change_probs(frames: usize, boundaries: &[usize]) -> Vec<f64> {
    let mut probs = vec![0.0; frames];
    if let Some(first) = probs.first_mut() {
        *first = 1.0;
    }
    for &b in boundaries {
        if let Some(p) = probs.get_mut(b) {
            *p = 1.0;
        }
    }
    probs
}

fn candidate(start: usize, end: usize, log_prob: f64) -> RangeCandidate {
    RangeCandidate {
        range: ChordRange { start, end },
        log_prob,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harmonic_core::check_tiling;
    use pretty_assertions::assert_eq;

    fn r(start: usize, end: usize) -> ChordRange {
        ChordRange { start, end }
    }

    #[test]
    fn single_chord_when_no_changes() {
        let proposer = RangeProposer::new(0.25, 0.45, 5);
        let next = proposer.next_ranges(&[1.0, 0.0, 0.0, 0.0], 0);
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].range, r(0, 4));
        assert_eq!(next[0].log_prob, 0.0);
    }

    #[test]
    fn forced_split() {
        let proposer = RangeProposer::new(0.2, 0.9, 5);
        let probs = [1.0, 0.1, 1.0, 0.1];
        let segs = proposer.segmentations(&probs);
        assert_eq!(segs.len(), 1);
        assert_eq!(segs[0].ranges, vec![r(0, 2), r(2, 4)]);
    }

    #[test]
    fn ambiguous_frame_branches_once() {
        let proposer = RangeProposer::new(0.2, 0.9, 2);
        let probs = [1.0, 0.1, 0.5, 0.1];
        let segs = proposer.segmentations(&probs);
        assert_eq!(segs.len(), 2);
        let mut all: Vec<_> = segs.iter().map(|s| s.ranges.clone()).collect();
        all.sort();
        assert_eq!(all, vec![vec![r(0, 2), r(2, 4)], vec![r(0, 4)]]);
        // The two only differ at frame 2, where ln 0.5 == ln(1 - 0.5).
        assert!((segs[0].log_prob - segs[1].log_prob).abs() < 1e-12);
    }

    #[test]
    fn threshold_edges() {
        let proposer = RangeProposer::new(0.2, 0.9, 5);
        assert_eq!(proposer.classify(0.9), Boundary::Forced);
        assert_eq!(proposer.classify(0.2), Boundary::Ambiguous);
        assert_eq!(proposer.classify(0.19999), Boundary::Never);

        // Exactly at the upper threshold: always split, nothing scanned past it.
        let next = proposer.next_ranges(&[1.0, 0.9, 0.5], 0);
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].range, r(0, 1));

        // Strictly below the lower threshold: never a boundary.
        let next = proposer.next_ranges(&[1.0, 0.19, 0.0], 0);
        assert_eq!(next.iter().map(|c| c.range).collect::<Vec<_>>(), vec![r(0, 3)]);
    }

    #[test]
    fn branching_bound_keeps_best() {
        let proposer = RangeProposer::new(0.1, 0.95, 2);
        let next = proposer.next_ranges(&[1.0, 0.8, 0.6, 0.3, 0.2], 0);
        assert_eq!(next.len(), 2);
        assert_eq!(next[0].range, r(0, 1));
        assert!(next[0].log_prob >= next[1].log_prob);
    }

    #[test]
    fn segmentation_log_prob_is_sum_over_frames() {
        let proposer = RangeProposer::new(0.1, 0.95, 10);
        let probs = [1.0, 0.3, 0.6, 0.2];
        for seg in proposer.segmentations(&probs) {
            check_tiling(&seg.ranges, probs.len()).unwrap();
            let starts: Vec<usize> = seg.ranges.iter().map(|r| r.start).collect();
            let expected: f64 = (1..probs.len())
                .map(|f| {
                    if starts.contains(&f) {
                        probs[f].ln()
                    } else {
                        (1.0 - probs[f]).ln()
                    }
                })
                .sum();
            assert!((seg.log_prob - expected).abs() < 1e-12, "{seg:?}");
        }
    }

    #[test]
    fn oracle_probs_mark_boundaries() {
        assert_eq!(oracle_change_probs(5, &[0, 3]), vec![1.0, 0.0, 0.0, 1.0, 0.0]);
        assert_eq!(oracle_change_probs(2, &[7]), vec![1.0, 0.0]);
    }
}
