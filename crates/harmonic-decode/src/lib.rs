//! Joint key and chord decoding for symbolic music.
//!
//! Six scoring components (initial chord prior, chord change detector,
//! chord classifier, chord sequence model, key change detector, key sequence
//! model) are combined by a beam search into one segmented analysis that
//! tiles the piece. [`HarmonicEngine`] wraps the decoder with piece loading
//! and an optional SQLite result cache.

pub mod analysis;
pub mod cache;
pub mod decoder;
pub mod error;
pub mod eval;
pub mod observer;
pub mod proposer;
pub mod session;
pub mod state;
pub mod submodels;

pub use analysis::{DecodedAnalysis, DecodedChord, DecodedKey, ResolvedAnalysis};
pub use cache::{decode_fingerprint, piece_content_hash, CachedDecode, DecodeCache};
pub use decoder::{BeamSearchDecoder, DecodeOutcome};
pub use error::{DecodeError, Submodel};
pub use eval::{evaluate_batch, evaluate_piece, EvaluationSummary, PieceEvaluation};
pub use observer::{DecodeObserver, NoopObserver, RecordingObserver, RoundSnapshot};
pub use proposer::{RangeCandidate, RangeProposer};
pub use session::{DecodeSession, RangeSource};
pub use state::{State, StateArena, StateId, Transition};
pub use submodels::SubmodelSet;

use anyhow::{Context, Result};
use harmonic_conf::HarmonicConfig;
use harmonic_core::{check_tiling, Piece, PieceRecord, Timeline};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Current algorithm version; bump to invalidate cached decodes.
pub const CURRENT_VERSION: u32 = 1;

/// Pieces plus the submodels to decode them with, as read from JSON.
///
/// Without `models` the heuristic submodels for the configured vocabulary
/// are used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(default)]
    pub pieces: Vec<PieceRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub models: Option<SubmodelSet>,
}

/// Decoder, submodels and cache for one configuration.
pub struct HarmonicEngine {
    decoder: BeamSearchDecoder,
    models: SubmodelSet,
    cache: Option<DecodeCache>,
    fingerprint: String,
}

impl HarmonicEngine {
    /// Build from config, opening the cache when `paths.cache_db` is set.
    pub fn new(config: &HarmonicConfig, models: SubmodelSet) -> Result<Self> {
        let cache = match &config.paths.cache_db {
            Some(path) => Some(DecodeCache::open(path).context("opening decode cache")?),
            None => None,
        };
        Self::with_cache(config, models, cache)
    }

    pub fn with_cache(config: &HarmonicConfig, models: SubmodelSet, cache: Option<DecodeCache>) -> Result<Self> {
        let decoder = BeamSearchDecoder::new(config.decoder.clone(), &config.vocabulary)
            .context("building decoder")?;
        models
            .check_vocabularies(decoder.chord_vocabulary(), decoder.key_vocabulary())
            .context("submodels do not match the configured vocabulary")?;
        let fingerprint = decode_fingerprint(&config.fingerprint(), &models)?;
        Ok(Self {
            decoder,
            models,
            cache,
            fingerprint,
        })
    }

    /// Heuristic submodels for the configured vocabulary.
    pub fn heuristic(config: &HarmonicConfig) -> Result<Self> {
        let models = SubmodelSet::heuristic(
            &config.vocabulary.chord_vocabulary(),
            &config.vocabulary.key_vocabulary(),
        );
        Self::new(config, models)
    }

    pub fn decoder(&self) -> &BeamSearchDecoder {
        &self.decoder
    }

    pub fn models(&self) -> &SubmodelSet {
        &self.models
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Annotated records become evaluable pieces; records without chords
    /// are decoded from their frames alone.
    pub fn load_piece(&self, record: PieceRecord) -> Result<Piece> {
        let id = record.id.clone();
        let piece = if record.chords.is_empty() {
            let timeline = Timeline::new(record.frames)
                .with_context(|| format!("building timeline for piece {id}"))?;
            Piece::unannotated(record.id, timeline)
        } else {
            Piece::from_record(record, self.decoder.chord_vocabulary())
                .with_context(|| format!("loading piece {id}"))?
        };
        Ok(piece)
    }

    /// Up to `n_best` analyses, from the cache when a current entry for the
    /// same piece content can answer the request.
    pub fn analyze(&self, piece: &Piece, n_best: usize) -> Result<Vec<DecodedAnalysis>> {
        let n_best = n_best.max(1);
        let content_hash = match &self.cache {
            Some(cache) => {
                let content_hash = piece_content_hash(piece)?;
                if let Some(hit) = cache.get(piece.id(), &content_hash, &self.fingerprint, CURRENT_VERSION)? {
                    let frames = piece.timeline().len();
                    let tiled = hit
                        .analyses
                        .iter()
                        .all(|a| check_tiling(&a.chord_ranges(), frames).is_ok());
                    if !tiled {
                        warn!(piece = piece.id(), frames, "cached decode does not tile the piece, decoding");
                    } else if hit.satisfies(n_best) {
                        info!(piece = piece.id(), "decode cache hit");
                        return Ok(hit.analyses.into_iter().take(n_best).collect());
                    }
                }
                info!(piece = piece.id(), "decode cache miss, decoding");
                Some(content_hash)
            }
            None => None,
        };

        let analyses = self
            .decoder
            .decode_nbest(piece, &self.models, n_best)
            .with_context(|| format!("decoding piece {}", piece.id()))?;

        if let (Some(cache), Some(content_hash)) = (&self.cache, content_hash) {
            cache.put(
                piece.id(),
                &content_hash,
                &self.fingerprint,
                CURRENT_VERSION,
                n_best,
                &analyses,
            )?;
        }
        Ok(analyses)
    }

    /// Decode with a caller-supplied observer, bypassing the cache.
    pub fn analyze_observed(
        &self,
        piece: &Piece,
        source: RangeSource,
        n_best: usize,
        observer: &mut dyn DecodeObserver,
    ) -> Result<DecodeOutcome> {
        self.decoder
            .decode_with(piece, &self.models, source, n_best, observer)
            .with_context(|| format!("decoding piece {}", piece.id()))
    }

    pub fn resolve(&self, analysis: &DecodedAnalysis) -> Result<ResolvedAnalysis> {
        Ok(analysis.resolve(self.decoder.chord_vocabulary(), self.decoder.key_vocabulary())?)
    }

    pub fn evaluate(&self, pieces: &[Piece], source: RangeSource) -> Result<EvaluationSummary> {
        Ok(evaluate_batch(&self.decoder, &self.models, pieces, source)?)
    }
}
