use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use harmonic_conf::{ConfigSources, HarmonicConfig};
use harmonic_core::Piece;
use harmonic_decode::{
    Bundle, DecodeError, DecodedAnalysis, EvaluationSummary, HarmonicEngine, RangeSource, RecordingObserver,
    ResolvedAnalysis, SubmodelSet,
};
use serde::Serialize;
use tracing::{info, warn};

pub struct DecodeOptions {
    pub n_best: usize,
    pub oracle: bool,
    pub raw: bool,
    pub no_cache: bool,
    pub trace: Option<PathBuf>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum AnalysisOutput {
    Raw(DecodedAnalysis),
    Resolved(ResolvedAnalysis),
}

#[derive(Serialize)]
struct PieceOutput {
    piece_id: String,
    analyses: Vec<AnalysisOutput>,
}

#[derive(Serialize)]
struct Failure {
    piece_id: String,
    error: String,
}

#[derive(Serialize)]
struct DecodeReport {
    pieces: Vec<PieceOutput>,
    failed: Vec<Failure>,
}

#[derive(Serialize)]
struct EvalReport<'a> {
    pieces: usize,
    failed: usize,
    range_recall: f64,
    range_precision: f64,
    label_accuracy: f64,
    chord_frame_accuracy: f64,
    key_frame_accuracy: f64,
    summary: &'a EvaluationSummary,
}

fn read_bundle(path: &Path) -> Result<Bundle> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading bundle {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing bundle {}", path.display()))
}

fn build_engine(config: &HarmonicConfig, models: Option<SubmodelSet>, use_cache: bool) -> Result<HarmonicEngine> {
    let models = models.unwrap_or_else(|| {
        SubmodelSet::heuristic(
            &config.vocabulary.chord_vocabulary(),
            &config.vocabulary.key_vocabulary(),
        )
    });
    if use_cache {
        HarmonicEngine::new(config, models)
    } else {
        HarmonicEngine::with_cache(config, models, None)
    }
}

/// Malformed piece records are logged and reported, never fatal.
fn load_pieces(engine: &HarmonicEngine, bundle: Bundle, failed: &mut Vec<Failure>) -> Vec<Piece> {
    let mut pieces = Vec::new();
    for record in bundle.pieces {
        let id = record.id.clone();
        match engine.load_piece(record) {
            Ok(piece) => pieces.push(piece),
            Err(e) => {
                warn!(piece = %id, error = %format!("{e:#}"), "skipping malformed piece");
                failed.push(Failure {
                    piece_id: id,
                    error: format!("{e:#}"),
                });
            }
        }
    }
    pieces
}

/// Per-piece decode failures are reported; anything else aborts.
fn is_per_piece(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<DecodeError>()
        .is_some_and(DecodeError::is_per_piece)
}

pub fn decode(config: &HarmonicConfig, bundle_path: &Path, options: DecodeOptions) -> Result<()> {
    let mut bundle = read_bundle(bundle_path)?;
    let models = bundle.models.take();
    let engine = build_engine(config, models, !options.no_cache && options.trace.is_none())?;
    let source = if options.oracle {
        RangeSource::Oracle
    } else {
        RangeSource::Detected
    };

    let mut report = DecodeReport {
        pieces: Vec::new(),
        failed: Vec::new(),
    };
    let pieces = load_pieces(&engine, bundle, &mut report.failed);
    let mut traces: BTreeMap<String, RecordingObserver> = BTreeMap::new();

    for piece in &pieces {
        let result = if options.trace.is_some() || source == RangeSource::Oracle {
            let mut observer = RecordingObserver::default();
            let outcome = engine.analyze_observed(piece, source, options.n_best, &mut observer);
            if options.trace.is_some() {
                traces.insert(piece.id().to_string(), observer);
            }
            outcome.map(|o| o.analyses)
        } else {
            engine.analyze(piece, options.n_best)
        };

        let analyses = match result {
            Ok(analyses) => analyses,
            Err(e) if is_per_piece(&e) => {
                warn!(piece = piece.id(), error = %format!("{e:#}"), "decode failed");
                report.failed.push(Failure {
                    piece_id: piece.id().to_string(),
                    error: format!("{e:#}"),
                });
                continue;
            }
            Err(e) => return Err(e),
        };

        let analyses = if options.raw {
            analyses.into_iter().map(AnalysisOutput::Raw).collect()
        } else {
            analyses
                .iter()
                .map(|a| engine.resolve(a).map(AnalysisOutput::Resolved))
                .collect::<Result<Vec<_>>>()?
        };
        report.pieces.push(PieceOutput {
            piece_id: piece.id().to_string(),
            analyses,
        });
    }

    if let Some(path) = &options.trace {
        let json = serde_json::to_string_pretty(&traces).context("serializing trace")?;
        std::fs::write(path, json).with_context(|| format!("writing trace {}", path.display()))?;
        info!(path = %path.display(), pieces = traces.len(), "wrote decode trace");
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub fn eval(config: &HarmonicConfig, bundle_path: &Path, oracle: bool) -> Result<()> {
    let mut bundle = read_bundle(bundle_path)?;
    let models = bundle.models.take();
    let engine = build_engine(config, models, false)?;
    let source = if oracle {
        RangeSource::Oracle
    } else {
        RangeSource::Detected
    };

    let mut malformed = Vec::new();
    let pieces = load_pieces(&engine, bundle, &mut malformed);
    let mut summary = engine.evaluate(&pieces, source)?;
    summary
        .failed
        .extend(malformed.into_iter().map(|f| harmonic_decode::eval::FailedPiece {
            piece_id: f.piece_id,
            error: f.error,
        }));

    let report = EvalReport {
        pieces: summary.pieces.len(),
        failed: summary.failed.len(),
        range_recall: summary.range_recall(),
        range_precision: summary.range_precision(),
        label_accuracy: summary.label_accuracy(),
        chord_frame_accuracy: summary.chord_frame_accuracy(),
        key_frame_accuracy: summary.key_frame_accuracy(),
        summary: &summary,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub fn print_sources(sources: &ConfigSources) {
    if sources.files.is_empty() {
        println!("files: (none, using defaults)");
    } else {
        println!("files:");
        for file in &sources.files {
            println!("  {}", file.display());
        }
    }
    if sources.env_overrides.is_empty() {
        println!("env: (none)");
    } else {
        println!("env:");
        for var in &sources.env_overrides {
            println!("  {var}");
        }
    }
}
