//! Immutable decoding hypotheses stored in an append-only arena.

use harmonic_core::ChordRange;
use serde::Serialize;

use crate::error::{DecodeError, Result};
use crate::submodels::LOG_PROB_TOLERANCE;

/// Arena index of a state. Ids are handed out in creation order, so
/// comparing ids compares creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct StateId(usize);

impl StateId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// What produced a state from its parent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    Root,
    Chord { label: usize, range: ChordRange },
    KeyChange,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct State {
    pub id: StateId,
    pub parent: Option<StateId>,
    pub transition: Transition,
    /// Current key index.
    pub key: usize,
    pub log_prob: f64,
    /// Frame up to which chords have been decoded.
    pub end: usize,
    pub chord_count: usize,
    pub chords_in_key: usize,
}

/// Append-only store of states for one decode. Children refer to parents
/// by index; nothing is mutated after insertion.
#[derive(Debug, Clone)]
pub struct StateArena {
    piece: String,
    states: Vec<State>,
}

impl StateArena {
    pub fn new(piece: impl Into<String>) -> Self {
        Self {
            piece: piece.into(),
            states: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn get(&self, id: StateId) -> &State {
        &self.states[id.0]
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    fn push(&mut self, build: impl FnOnce(StateId) -> State) -> StateId {
        let id = StateId(self.states.len());
        self.states.push(build(id));
        id
    }

    fn consistency(&self, detail: String) -> DecodeError {
        DecodeError::Consistency {
            piece: self.piece.clone(),
            detail,
        }
    }

    /// Rounding noise above zero is clamped; anything larger would make a
    /// child more probable than its parent.
    fn check_delta(&self, delta: f64) -> Result<f64> {
        if delta.is_nan() || delta > LOG_PROB_TOLERANCE {
            return Err(self.consistency(format!("transition log-probability {delta} is not <= 0")));
        }
        Ok(delta.min(0.0))
    }

    pub fn root(&mut self, key: usize, log_prob: f64) -> Result<StateId> {
        let log_prob = self.check_delta(log_prob)?;
        Ok(self.push(|id| State {
            id,
            parent: None,
            transition: Transition::Root,
            key,
            log_prob,
            end: 0,
            chord_count: 0,
            chords_in_key: 0,
        }))
    }

    /// Extend `parent` with a key-relative chord label over `range`.
    pub fn chord_transition(
        &mut self,
        parent: StateId,
        label: usize,
        range: ChordRange,
        delta: f64,
    ) -> Result<StateId> {
        let delta = self.check_delta(delta)?;
        let p = self.get(parent).clone();
        if range.start != p.end || range.is_empty() {
            return Err(self.consistency(format!(
                "range {range} does not continue a hypothesis ending at frame {}",
                p.end
            )));
        }
        Ok(self.push(|id| State {
            id,
            parent: Some(parent),
            transition: Transition::Chord { label, range },
            key: p.key,
            log_prob: p.log_prob + delta,
            end: range.end,
            chord_count: p.chord_count + 1,
            chords_in_key: p.chords_in_key + 1,
        }))
    }

    /// Switch `parent` to a new key at its current boundary.
    pub fn key_transition(&mut self, parent: StateId, key: usize, delta: f64) -> Result<StateId> {
        let delta = self.check_delta(delta)?;
        let p = self.get(parent).clone();
        if p.key == key {
            return Err(self.consistency(format!("key change to the current key {key}")));
        }
        Ok(self.push(|id| State {
            id,
            parent: Some(parent),
            transition: Transition::KeyChange,
            key,
            log_prob: p.log_prob + delta,
            end: p.end,
            chord_count: p.chord_count,
            chords_in_key: 0,
        }))
    }

    /// Ancestors of `id` from the root down, including `id` itself.
    pub fn lineage(&self, id: StateId) -> Vec<&State> {
        let mut chain = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let state = self.get(current);
            chain.push(state);
            cursor = state.parent;
        }
        chain.reverse();
        chain
    }

    /// `(label, range)` for every chord on the path to `id`.
    pub fn chord_history(&self, id: StateId) -> Vec<(usize, ChordRange)> {
        self.lineage(id)
            .into_iter()
            .filter_map(|s| match s.transition {
                Transition::Chord { label, range } => Some((label, range)),
                _ => None,
            })
            .collect()
    }

    /// `(key, start frame)` for every key on the path to `id`.
    pub fn key_history(&self, id: StateId) -> Vec<(usize, usize)> {
        self.lineage(id)
            .into_iter()
            .filter(|s| matches!(s.transition, Transition::Root | Transition::KeyChange))
            .map(|s| (s.key, s.end))
            .collect()
    }

    /// Key indices on the path to `id`, oldest first.
    pub fn keys(&self, id: StateId) -> Vec<usize> {
        self.key_history(id).into_iter().map(|(k, _)| k).collect()
    }

    /// Chord labels decoded since the last key change, oldest first.
    pub fn chords_in_key(&self, id: StateId) -> Vec<usize> {
        self.recent_labels(id, self.get(id).chords_in_key)
    }

    /// Up to `n` most recent chord labels, oldest first.
    pub fn recent_labels(&self, id: StateId, n: usize) -> Vec<usize> {
        let mut labels = Vec::with_capacity(n);
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if labels.len() == n {
                break;
            }
            let state = self.get(current);
            if let Transition::Chord { label, .. } = state.transition {
                labels.push(label);
            }
            cursor = state.parent;
        }
        labels.reverse();
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn r(start: usize, end: usize) -> ChordRange {
        ChordRange { start, end }
    }

    #[test]
    fn traceback_builds_histories() {
        let mut arena = StateArena::new("p");
        let root = arena.root(3, -0.5).unwrap();
        let a = arena.chord_transition(root, 10, r(0, 2), -1.0).unwrap();
        let k = arena.key_transition(a, 5, -2.0).unwrap();
        let b = arena.chord_transition(k, 11, r(2, 3), -0.25).unwrap();

        assert_eq!(arena.chord_history(b), vec![(10, r(0, 2)), (11, r(2, 3))]);
        assert_eq!(arena.key_history(b), vec![(3, 0), (5, 2)]);
        assert_eq!(arena.chords_in_key(b), vec![11]);
        assert_eq!(arena.recent_labels(b, 5), vec![10, 11]);
        assert_eq!(arena.get(b).log_prob, -3.75);
        assert_eq!(arena.get(b).chord_count, 2);
    }

    #[test]
    fn children_never_beat_parents() {
        let mut arena = StateArena::new("p");
        let root = arena.root(0, 0.0).unwrap();
        assert!(arena.chord_transition(root, 0, r(0, 1), 0.5).is_err());
        assert!(arena.chord_transition(root, 0, r(0, 1), f64::NAN).is_err());
        // Rounding noise is clamped.
        let child = arena.chord_transition(root, 0, r(0, 1), 1e-12).unwrap();
        assert_eq!(arena.get(child).log_prob, 0.0);
    }

    #[test]
    fn ranges_must_be_contiguous() {
        let mut arena = StateArena::new("gap");
        let root = arena.root(0, 0.0).unwrap();
        let a = arena.chord_transition(root, 0, r(0, 2), 0.0).unwrap();
        let err = arena.chord_transition(a, 0, r(3, 4), 0.0).unwrap_err();
        assert!(matches!(err, DecodeError::Consistency { ref piece, .. } if piece == "gap"));
    }

    #[test]
    fn key_change_must_change_key() {
        let mut arena = StateArena::new("p");
        let root = arena.root(4, 0.0).unwrap();
        assert!(arena.key_transition(root, 4, 0.0).is_err());
    }

    #[test]
    fn ids_follow_creation_order() {
        let mut arena = StateArena::new("p");
        let a = arena.root(0, 0.0).unwrap();
        let b = arena.root(1, 0.0).unwrap();
        assert!(a < b);
        assert_eq!(b.index(), 1);
    }
}
