//! Beam search over joint key and chord hypotheses.
//!
//! Beams are keyed by frame position. Each round takes the lowest open
//! position, prunes its beam, decides key changes at that boundary, and
//! extends every surviving hypothesis over every candidate next chord range.
//! Children land in the beam at their range end, so a round only ever reads
//! states frozen by earlier rounds. Decoding finishes when the only open
//! beam is the one at the end of the piece.

use std::collections::{BTreeMap, HashSet};

use harmonic_conf::{DecoderConfig, VocabularyConfig};
use harmonic_core::{ChordRange, ChordVocabulary, KeyMode, KeyVocabulary, Piece};
use serde::Serialize;
use tracing::{debug, info};

use crate::analysis::DecodedAnalysis;
use crate::error::{DecodeError, Result};
use crate::observer::{DecodeObserver, NoopObserver, RoundSnapshot};
use crate::proposer::{RangeCandidate, RangeProposer};
use crate::session::{DecodeSession, RangeSource};
use crate::state::{StateArena, StateId};
use crate::submodels::{top_k, KeyChangeContext, SubmodelSet};

/// Everything one decode produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodeOutcome {
    /// Best first; never empty.
    pub analyses: Vec<DecodedAnalysis>,
    pub rounds: usize,
    /// States created over the whole search.
    pub states: usize,
}

/// A hypothesis ready for chord extension, plus any key-boundary
/// log-probability not yet folded into its state.
#[derive(Debug, Clone, Copy)]
struct Seed {
    state: StateId,
    extra: f64,
}

#[derive(Debug, Clone)]
pub struct BeamSearchDecoder {
    config: DecoderConfig,
    chords: ChordVocabulary,
    keys: KeyVocabulary,
    proposer: RangeProposer,
}

impl BeamSearchDecoder {
    pub fn new(config: DecoderConfig, vocabulary: &VocabularyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            proposer: RangeProposer::from_config(&config),
            chords: vocabulary.chord_vocabulary(),
            keys: vocabulary.key_vocabulary(),
            config,
        })
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn chord_vocabulary(&self) -> &ChordVocabulary {
        &self.chords
    }

    pub fn key_vocabulary(&self) -> &KeyVocabulary {
        &self.keys
    }

    /// Best analysis using detected chord boundaries.
    pub fn decode(&self, piece: &Piece, models: &SubmodelSet) -> Result<DecodedAnalysis> {
        let mut outcome = self.decode_with(piece, models, RangeSource::Detected, 1, &mut NoopObserver)?;
        outcome.analyses.truncate(1);
        outcome.analyses.pop().ok_or_else(|| DecodeError::Exhausted {
            piece: piece.id().to_string(),
            frame: piece.timeline().len(),
        })
    }

    /// Up to `n` best analyses, best first.
    pub fn decode_nbest(&self, piece: &Piece, models: &SubmodelSet, n: usize) -> Result<Vec<DecodedAnalysis>> {
        Ok(self
            .decode_with(piece, models, RangeSource::Detected, n, &mut NoopObserver)?
            .analyses)
    }

    pub fn decode_with(
        &self,
        piece: &Piece,
        models: &SubmodelSet,
        source: RangeSource,
        n_best: usize,
        observer: &mut dyn DecodeObserver,
    ) -> Result<DecodeOutcome> {
        models.check_vocabularies(&self.chords, &self.keys)?;

        let mut session = DecodeSession::new(piece, models, source, observer)?;
        let frames = session.frames();
        let mut arena = StateArena::new(piece.id());
        let mut beams: BTreeMap<usize, Vec<StateId>> = BTreeMap::new();
        beams.insert(0, self.roots(&mut arena, models)?);

        let mut rounds = 0;
        while let Some((position, beam)) = beams.pop_first() {
            if position == frames {
                beams.insert(position, beam);
                break;
            }
            if let Some(limit) = self.config.max_rounds {
                if rounds >= limit {
                    return Err(DecodeError::RoundLimit {
                        piece: piece.id().to_string(),
                        rounds,
                    });
                }
            }

            let before = beam.len();
            let beam = self.prune(&arena, beam);
            let best_log_prob = beam
                .first()
                .map(|&id| arena.get(id).log_prob)
                .unwrap_or(f64::NEG_INFINITY);

            let (seeds, key_changes) = if position == 0 {
                (
                    beam.iter().map(|&state| Seed { state, extra: 0.0 }).collect(),
                    0,
                )
            } else {
                self.key_boundary(&mut arena, models, &beam, position, piece.id(), observer)?
            };

            let children = self.extend(&mut arena, &mut session, models, &seeds, position, &mut beams, observer)?;
            let snapshot = RoundSnapshot {
                round: rounds,
                position,
                beam_size: beam.len(),
                pruned: before - beam.len(),
                best_log_prob,
                key_changes,
                children,
            };
            debug!(
                piece = piece.id(),
                round = rounds,
                position,
                beam = snapshot.beam_size,
                pruned = snapshot.pruned,
                key_changes,
                children,
                best = best_log_prob,
                "decoder round"
            );
            observer.round(piece.id(), &snapshot);
            rounds += 1;

            if children == 0 {
                return Err(DecodeError::Exhausted {
                    piece: piece.id().to_string(),
                    frame: position,
                });
            }
        }

        let mut finals = beams.remove(&frames).ok_or_else(|| DecodeError::Exhausted {
            piece: piece.id().to_string(),
            frame: frames,
        })?;
        sort_by_score(&arena, &mut finals);
        finals.truncate(n_best.max(1));

        let analyses = finals
            .iter()
            .map(|&id| DecodedAnalysis::from_state(&arena, id, piece.id(), frames))
            .collect::<Result<Vec<_>>>()?;

        info!(
            piece = piece.id(),
            frames,
            rounds,
            states = arena.len(),
            chords = analyses[0].chords.len(),
            keys = analyses[0].keys.len(),
            log_prob = analyses[0].log_prob,
            "decoded piece"
        );

        Ok(DecodeOutcome {
            analyses,
            rounds,
            states: arena.len(),
        })
    }

    /// One root per plausible initial key.
    fn roots(&self, arena: &mut StateArena, models: &SubmodelSet) -> Result<Vec<StateId>> {
        let empty: &[usize] = &[];
        let dist = models
            .key_sequence
            .score(&[empty])?
            .pop()
            .unwrap_or_default();
        top_k(&dist, self.config.max_key_branching_factor)
            .into_iter()
            .map(|key| arena.root(key, dist[key]))
            .collect()
    }

    /// Best first, ties to the earliest state, duplicates merged, then
    /// truncated to the beam width.
    fn prune(&self, arena: &StateArena, mut beam: Vec<StateId>) -> Vec<StateId> {
        sort_by_score(arena, &mut beam);
        if let Some(n) = self.config.hash_length {
            let mut seen = HashSet::new();
            beam.retain(|&id| seen.insert((arena.get(id).key, arena.recent_labels(id, n))));
        }
        beam.truncate(self.config.beam_width);
        beam
    }

    fn key_boundary(
        &self,
        arena: &mut StateArena,
        models: &SubmodelSet,
        beam: &[StateId],
        position: usize,
        piece: &str,
        observer: &mut dyn DecodeObserver,
    ) -> Result<(Vec<Seed>, usize)> {
        let contexts: Vec<KeyChangeContext> = beam
            .iter()
            .map(|&id| {
                let state = arena.get(id);
                KeyChangeContext {
                    frame: position,
                    key: state.key,
                    chords_in_key: state.chords_in_key,
                }
            })
            .collect();
        let probs = models.key_change.score(&contexts)?;

        let mut seeds = Vec::new();
        let mut changing = Vec::new();
        for (&id, &p) in beam.iter().zip(&probs) {
            observer.key_change_scored(piece, position, arena.get(id).key, p);
            let forced = p >= self.config.max_no_key_change_prob;
            let forbidden = p < self.config.min_key_change_prob;
            if !forced {
                seeds.push(Seed {
                    state: id,
                    extra: (1.0 - p).ln(),
                });
            }
            if !forbidden && p > 0.0 {
                changing.push((id, p));
            }
        }
        if changing.is_empty() {
            return Ok((seeds, 0));
        }

        let histories: Vec<Vec<usize>> = changing.iter().map(|&(id, _)| arena.keys(id)).collect();
        let refs: Vec<&[usize]> = histories.iter().map(Vec::as_slice).collect();
        let dists = models.key_sequence.score(&refs)?;

        let mut key_changes = 0;
        for ((id, p), mut dist) in changing.into_iter().zip(dists) {
            let current = arena.get(id).key;
            if let Some(slot) = dist.get_mut(current) {
                *slot = f64::NEG_INFINITY;
            }
            for key in top_k(&dist, self.config.max_key_branching_factor) {
                let state = arena.key_transition(id, key, p.ln() + dist[key])?;
                seeds.push(Seed { state, extra: 0.0 });
                key_changes += 1;
            }
        }
        Ok((seeds, key_changes))
    }

    /// Extend every seed over every candidate range starting at `position`.
    #[allow(clippy::too_many_arguments)]
    fn extend(
        &self,
        arena: &mut StateArena,
        session: &mut DecodeSession<'_>,
        models: &SubmodelSet,
        seeds: &[Seed],
        position: usize,
        beams: &mut BTreeMap<usize, Vec<StateId>>,
        observer: &mut dyn DecodeObserver,
    ) -> Result<usize> {
        if seeds.is_empty() {
            return Ok(0);
        }
        let candidates: Vec<RangeCandidate> = self
            .proposer
            .next_ranges(session.change_probs(), position)
            .into_iter()
            .filter(|c| c.log_prob.is_finite())
            .collect();
        let ranges: Vec<ChordRange> = candidates.iter().map(|c| c.range).collect();
        session.score_ranges(models, &ranges, observer)?;

        let priors = self.priors(arena, models, seeds, session.piece().id(), observer)?;

        let mut children = 0;
        for (seed, prior) in seeds.iter().zip(&priors) {
            let tonic = self.keys.label_at(arena.get(seed.state).key)?.tonic;
            session.prepare_tonic(&self.chords, tonic)?;

            for candidate in &candidates {
                let combined = match (session.absolute_map(tonic), session.range_scores(candidate.range)) {
                    (Some(map), Some(scores)) => combine(map, scores, prior),
                    _ => {
                        return Err(DecodeError::Consistency {
                            piece: session.piece().id().to_string(),
                            detail: format!("range {} was not scored before extension", candidate.range),
                        })
                    }
                };
                for label in top_k(&combined, self.config.max_chord_branching_factor) {
                    let delta = seed.extra + candidate.log_prob + combined[label];
                    let child = arena.chord_transition(seed.state, label, candidate.range, delta)?;
                    beams.entry(candidate.range.end).or_default().push(child);
                    children += 1;
                }
            }
        }
        Ok(children)
    }

    /// Next-chord prior per seed: the initial-chord prior for a seed with no
    /// chords yet, otherwise the sequence model over chords in the current key.
    fn priors(
        &self,
        arena: &StateArena,
        models: &SubmodelSet,
        seeds: &[Seed],
        piece: &str,
        observer: &mut dyn DecodeObserver,
    ) -> Result<Vec<Vec<f64>>> {
        let mut initial = Vec::new();
        let mut sequential = Vec::new();
        for (i, seed) in seeds.iter().enumerate() {
            let state = arena.get(seed.state);
            if state.chord_count == 0 {
                initial.push((i, self.keys.label_at(state.key)?.mode));
            } else {
                sequential.push((i, arena.chords_in_key(seed.state)));
            }
        }

        let mut priors = vec![Vec::new(); seeds.len()];
        if !initial.is_empty() {
            let modes: Vec<KeyMode> = initial.iter().map(|&(_, mode)| mode).collect();
            for ((i, mode), dist) in initial.iter().zip(models.initial_chord.score(&modes)?) {
                observer.initial_prior(piece, *mode, &dist);
                priors[*i] = dist;
            }
        }
        if !sequential.is_empty() {
            let histories: Vec<&[usize]> = sequential.iter().map(|(_, h)| h.as_slice()).collect();
            let dists = models.chord_sequence.score(&histories)?;
            for ((i, _), dist) in sequential.iter().zip(dists) {
                priors[*i] = dist;
            }
        }
        Ok(priors)
    }
}

/// Classifier likelihood plus prior for every key-relative label.
fn combine(absolute_map: &[Option<usize>], scores: &[f64], prior: &[f64]) -> Vec<f64> {
    absolute_map
        .iter()
        .zip(prior)
        .map(|(abs, p)| match abs.and_then(|a| scores.get(a)) {
            Some(s) => s + p,
            None => f64::NEG_INFINITY,
        })
        .collect()
}

fn sort_by_score(arena: &StateArena, ids: &mut [StateId]) {
    ids.sort_by(|&a, &b| {
        arena
            .get(b)
            .log_prob
            .total_cmp(&arena.get(a).log_prob)
            .then(a.cmp(&b))
    });
}
