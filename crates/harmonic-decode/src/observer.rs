//! Read-only diagnostic sinks for intermediate decoder scores.

use harmonic_core::{ChordRange, KeyMode};
use serde::Serialize;

/// Summary of one decoder round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundSnapshot {
    pub round: usize,
    /// Frame position whose beam was expanded.
    pub position: usize,
    /// States kept after pruning.
    pub beam_size: usize,
    /// States that pruning dropped, including merged duplicates.
    pub pruned: usize,
    pub best_log_prob: f64,
    /// Key changes proposed this round.
    pub key_changes: usize,
    /// Chord extensions produced this round.
    pub children: usize,
}

/// Receives scores as the decoder computes them.
///
/// Observers cannot reach back into the decoder; every method takes data by
/// shared reference and returns nothing.
pub trait DecodeObserver {
    fn chord_change_probs(&mut self, _piece: &str, _probs: &[f64]) {}

    fn initial_prior(&mut self, _piece: &str, _mode: KeyMode, _log_prior: &[f64]) {}

    fn range_scored(&mut self, _piece: &str, _range: ChordRange, _log_probs: &[f64]) {}

    fn key_change_scored(&mut self, _piece: &str, _frame: usize, _key: usize, _prob: f64) {}

    fn round(&mut self, _piece: &str, _snapshot: &RoundSnapshot) {}
}

/// An observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl DecodeObserver for NoopObserver {}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyChangeRecord {
    pub frame: usize,
    pub key: usize,
    pub prob: f64,
}

/// Keeps everything it is shown, for inspection or JSON dumps.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct RecordingObserver {
    pub chord_change_probs: Vec<f64>,
    pub initial_priors: Vec<(KeyMode, Vec<f64>)>,
    pub scored_ranges: Vec<(ChordRange, Vec<f64>)>,
    pub key_changes: Vec<KeyChangeRecord>,
    pub rounds: Vec<RoundSnapshot>,
}

impl DecodeObserver for RecordingObserver {
    fn chord_change_probs(&mut self, _piece: &str, probs: &[f64]) {
        self.chord_change_probs = probs.to_vec();
    }

    fn initial_prior(&mut self, _piece: &str, mode: KeyMode, log_prior: &[f64]) {
        self.initial_priors.push((mode, log_prior.to_vec()));
    }

    fn range_scored(&mut self, _piece: &str, range: ChordRange, log_probs: &[f64]) {
        self.scored_ranges.push((range, log_probs.to_vec()));
    }

    fn key_change_scored(&mut self, _piece: &str, frame: usize, key: usize, prob: f64) {
        self.key_changes.push(KeyChangeRecord { frame, key, prob });
    }

    fn round(&mut self, _piece: &str, snapshot: &RoundSnapshot) {
        self.rounds.push(snapshot.clone());
    }
}
