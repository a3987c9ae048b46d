use harmonic_conf::{DecoderConfig, HarmonicConfig, PathsConfig, VocabularyConfig};
use harmonic_core::{
    check_tiling, ChordRange, ChordRecord, Frame, KeyMode, KeyRecord, OnsetLevel, Piece, PieceRecord, PitchType,
    Rational, Timeline,
};
use harmonic_decode::submodels::{
    ChordChangeDetector, ChordClassifier, KeyChangeDetector, RangeDistribution,
};
use harmonic_decode::{
    BeamSearchDecoder, DecodeCache, DecodeError, HarmonicEngine, RangeSource, RecordingObserver, Submodel,
    SubmodelSet,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn vocabulary() -> VocabularyConfig {
    VocabularyConfig {
        pitch_type: PitchType::Midi,
        use_inversions: false,
        use_relative: false,
    }
}

fn frame(i: usize, pitches: &[u8]) -> Frame {
    Frame::new(
        Rational::new(i as i64, 1),
        Rational::new(1, 1),
        OnsetLevel::Beat,
        pitches.to_vec(),
    )
}

fn piece(n: usize) -> Piece {
    let frames = (0..n).map(|i| frame(i, &[60, 64, 67])).collect();
    Piece::unannotated("test", Timeline::new(frames).unwrap())
}

/// Uniform chord scoring with the given change probabilities and no key changes.
fn flat_models(probs: &[f64]) -> SubmodelSet {
    let v = vocabulary();
    let chords = v.chord_vocabulary();
    let mut models = SubmodelSet::heuristic(&chords, &v.key_vocabulary());
    models.chord_change = ChordChangeDetector::Precomputed {
        probs: probs.to_vec(),
    };
    models.chord_classifier = ChordClassifier::Uniform {
        vocab_len: chords.len(),
    };
    models.key_change = KeyChangeDetector::Constant { prob: 0.0 };
    models
}

fn decoder(config: DecoderConfig) -> BeamSearchDecoder {
    BeamSearchDecoder::new(config, &vocabulary()).unwrap()
}

fn r(start: usize, end: usize) -> ChordRange {
    ChordRange { start, end }
}

#[test]
fn single_chord_single_key() {
    let decoded = decoder(DecoderConfig::default())
        .decode(&piece(4), &flat_models(&[1.0, 0.0, 0.0, 0.0]))
        .unwrap();
    assert_eq!(decoded.chord_ranges(), vec![r(0, 4)]);
    assert_eq!(decoded.keys.len(), 1);
    assert_eq!(decoded.keys[0].start, 0);
}

#[test]
fn forced_split() {
    let config = DecoderConfig {
        min_chord_change_prob: 0.2,
        max_no_chord_change_prob: 0.9,
        ..DecoderConfig::default()
    };
    let decoded = decoder(config)
        .decode(&piece(4), &flat_models(&[1.0, 0.1, 1.0, 0.1]))
        .unwrap();
    assert_eq!(decoded.chord_ranges(), vec![r(0, 2), r(2, 4)]);
}

#[test]
fn ambiguous_frame_keeps_both_segmentations() {
    let config = DecoderConfig {
        min_chord_change_prob: 0.2,
        max_no_chord_change_prob: 0.9,
        max_chord_branching_factor: 2,
        ..DecoderConfig::default()
    };
    let mut observer = RecordingObserver::default();
    let outcome = decoder(config)
        .decode_with(
            &piece(4),
            &flat_models(&[1.0, 0.1, 0.5, 0.1]),
            RangeSource::Detected,
            1000,
            &mut observer,
        )
        .unwrap();

    let mut segmentations: Vec<Vec<ChordRange>> = outcome.analyses.iter().map(|a| a.chord_ranges()).collect();
    segmentations.sort();
    segmentations.dedup();
    assert_eq!(segmentations, vec![vec![r(0, 2), r(2, 4)], vec![r(0, 4)]]);

    let mut scored: Vec<ChordRange> = observer.scored_ranges.iter().map(|(range, _)| *range).collect();
    scored.sort();
    assert_eq!(scored, vec![r(0, 2), r(0, 4), r(2, 4)]);
}

#[test]
fn upper_threshold_always_splits() {
    // Default thresholds: min 0.25, max_no 0.45.
    let outcome = decoder(DecoderConfig::default())
        .decode_nbest(&piece(4), &flat_models(&[1.0, 0.45, 0.0, 0.0]), 50)
        .unwrap();
    assert!(!outcome.is_empty());
    for analysis in &outcome {
        assert_eq!(analysis.chord_ranges(), vec![r(0, 1), r(1, 4)]);
    }
}

#[test]
fn below_lower_threshold_never_splits() {
    for beam_width in [1, 5, 50] {
        let config = DecoderConfig {
            beam_width,
            ..DecoderConfig::default()
        };
        let outcome = decoder(config)
            .decode_nbest(&piece(4), &flat_models(&[1.0, 0.2499, 0.0, 0.0]), 50)
            .unwrap();
        for analysis in &outcome {
            assert_eq!(analysis.chord_ranges(), vec![r(0, 4)]);
        }
    }
}

#[test]
fn nbest_sorted_and_tiled() {
    let probs = [1.0, 0.3, 0.6, 0.2, 0.4, 0.35, 0.9, 0.1];
    let frames = probs.len();
    let config = DecoderConfig {
        min_chord_change_prob: 0.15,
        max_no_chord_change_prob: 0.95,
        ..DecoderConfig::default()
    };
    let analyses = decoder(config)
        .decode_nbest(&piece(frames), &flat_models(&probs), 20)
        .unwrap();
    assert_eq!(analyses.len(), 20);
    for pair in analyses.windows(2) {
        assert!(pair[0].log_prob >= pair[1].log_prob);
    }
    for analysis in &analyses {
        assert!(analysis.log_prob <= 0.0);
        check_tiling(&analysis.chord_ranges(), frames).unwrap();
        let starts: Vec<usize> = analysis.chords.iter().map(|c| c.range.start).collect();
        assert!(analysis.keys.iter().all(|k| starts.contains(&k.start)));
    }
}

fn c_then_g() -> Piece {
    let c = [48, 60, 64, 67];
    let g = [43, 59, 62, 67];
    let frames = vec![frame(0, &c), frame(1, &c), frame(2, &g), frame(3, &g)];
    Piece::unannotated("cg", Timeline::new(frames).unwrap())
}

#[test]
fn heuristic_models_find_the_chords() {
    let v = vocabulary();
    let models = SubmodelSet::heuristic(&v.chord_vocabulary(), &v.key_vocabulary());
    let decoder = decoder(DecoderConfig::default());
    let decoded = decoder.decode(&c_then_g(), &models).unwrap();
    assert_eq!(decoded.chord_ranges(), vec![r(0, 2), r(2, 4)]);

    let resolved = decoded
        .resolve(decoder.chord_vocabulary(), decoder.key_vocabulary())
        .unwrap();
    let absolute: Vec<Option<String>> = resolved.chords.iter().map(|c| c.absolute.clone()).collect();
    assert_eq!(absolute, vec![Some("C:M".to_string()), Some("G:M".to_string())]);
}

#[test]
fn decoding_is_deterministic_and_observer_free() {
    let v = vocabulary();
    let models = SubmodelSet::heuristic(&v.chord_vocabulary(), &v.key_vocabulary());
    let decoder = decoder(DecoderConfig::default());
    let piece = c_then_g();

    let first = decoder.decode_nbest(&piece, &models, 5).unwrap();
    let second = decoder.decode_nbest(&piece, &models, 5).unwrap();
    assert_eq!(first, second);

    let mut observer = RecordingObserver::default();
    let observed = decoder
        .decode_with(&piece, &models, RangeSource::Detected, 5, &mut observer)
        .unwrap();
    assert_eq!(observed.analyses, first);
    assert_eq!(observer.rounds.len(), observed.rounds);
    assert_eq!(observer.chord_change_probs.len(), 4);
    assert!(!observer.initial_priors.is_empty());
}

#[test]
fn forced_key_change_lands_on_chord_boundary() {
    let mut models = flat_models(&[1.0, 0.0, 1.0, 0.0]);
    models.key_change = KeyChangeDetector::Precomputed {
        probs: vec![0.0, 0.0, 0.9, 0.0],
        default: 0.0,
    };
    let decoded = decoder(DecoderConfig::default()).decode(&piece(4), &models).unwrap();
    assert_eq!(decoded.keys.len(), 2);
    assert_eq!(decoded.keys[1].start, 2);
    assert_ne!(decoded.keys[0].label, decoded.keys[1].label);
    assert_eq!(decoded.chords[1].key, decoded.keys[1].label);
}

#[test]
fn oracle_ranges_follow_annotations() {
    let key = KeyRecord {
        tonic: "C".into(),
        mode: KeyMode::Major,
    };
    let chord = |start, root: &str| ChordRecord {
        start,
        root: root.into(),
        chord_type: "M".into(),
        figbass: String::new(),
        key: key.clone(),
        applied_to: None,
    };
    let record = PieceRecord {
        id: "oracle".into(),
        frames: (0..4).map(|i| frame(i, &[60, 64, 67])).collect(),
        chords: vec![chord(0, "C"), chord(2, "F")],
    };
    let piece = Piece::from_record(record, &vocabulary().chord_vocabulary()).unwrap();
    // The detector alone would merge everything into one chord.
    let models = flat_models(&[1.0, 0.0, 0.0, 0.0]);
    let decoder = decoder(DecoderConfig::default());

    let detected = decoder.decode(&piece, &models).unwrap();
    assert_eq!(detected.chord_ranges(), vec![r(0, 4)]);

    let oracle = decoder
        .decode_with(&piece, &models, RangeSource::Oracle, 1, &mut RecordingObserver::default())
        .unwrap();
    assert_eq!(oracle.analyses[0].chord_ranges(), vec![r(0, 2), r(2, 4)]);
}

#[test]
fn impossible_range_exhausts() {
    let v = vocabulary();
    let len = v.chord_vocabulary().len();
    let mut models = flat_models(&[1.0, 0.0, 1.0, 0.0]);
    models.chord_classifier = ChordClassifier::Precomputed {
        vocab_len: len,
        ranges: vec![RangeDistribution {
            range: r(2, 4),
            log_probs: vec![f64::NEG_INFINITY; len],
        }],
    };
    let err = decoder(DecoderConfig::default()).decode(&piece(4), &models).unwrap_err();
    assert!(matches!(err, DecodeError::Exhausted { frame: 2, ref piece } if piece == "test"), "{err}");
}

#[test]
fn bad_key_change_probability_is_scoring_error() {
    let mut models = flat_models(&[1.0, 1.0]);
    models.key_change = KeyChangeDetector::Constant { prob: 1.5 };
    let err = decoder(DecoderConfig::default()).decode(&piece(2), &models).unwrap_err();
    assert!(matches!(
        err,
        DecodeError::Scoring {
            submodel: Submodel::KeyChange,
            batch_index: 0,
            ..
        }
    ));
    assert!(err.is_per_piece());
}

#[test]
fn engine_caches_decodes() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("decodes.db");
    let config = HarmonicConfig {
        vocabulary: vocabulary(),
        paths: PathsConfig {
            cache_db: Some(db.clone()),
        },
        ..HarmonicConfig::default()
    };
    let engine = HarmonicEngine::heuristic(&config).unwrap();
    let piece = c_then_g();

    let first = engine.analyze(&piece, 2).unwrap();
    let second = engine.analyze(&piece, 1).unwrap();
    assert_eq!(second, first[..1].to_vec());
    drop(engine);

    let cache = DecodeCache::open(&db).unwrap();
    assert_eq!(cache.len().unwrap(), 1);

    // A different beam width is a different fingerprint.
    let mut narrower = config.clone();
    narrower.decoder.beam_width = 3;
    let engine = HarmonicEngine::heuristic(&narrower).unwrap();
    engine.analyze(&piece, 1).unwrap();
    assert_eq!(DecodeCache::open(&db).unwrap().len().unwrap(), 2);
}

#[test]
fn engine_evaluates_batches() {
    let config = HarmonicConfig {
        vocabulary: vocabulary(),
        ..HarmonicConfig::default()
    };
    let engine = HarmonicEngine::heuristic(&config).unwrap();
    let key = KeyRecord {
        tonic: "C".into(),
        mode: KeyMode::Major,
    };
    let record = PieceRecord {
        id: "cg".into(),
        frames: c_then_g().timeline().frames().to_vec(),
        chords: vec![
            ChordRecord {
                start: 0,
                root: "C".into(),
                chord_type: "M".into(),
                figbass: String::new(),
                key: key.clone(),
                applied_to: None,
            },
            ChordRecord {
                start: 2,
                root: "G".into(),
                chord_type: "M".into(),
                figbass: String::new(),
                key,
                applied_to: None,
            },
        ],
    };
    let piece = engine.load_piece(record).unwrap();
    let summary = engine.evaluate(&[piece], RangeSource::Detected).unwrap();
    assert_eq!(summary.failed.len(), 0);
    assert_eq!(summary.range_recall(), 1.0);
    assert_eq!(summary.label_accuracy(), 1.0);
    assert_eq!(summary.chord_frame_accuracy(), 1.0);
}

#[test]
fn evaluation_skips_exhausted_pieces() {
    let config = HarmonicConfig {
        vocabulary: vocabulary(),
        ..HarmonicConfig::default()
    };
    let v = vocabulary();
    let len = v.chord_vocabulary().len();
    let mut models = SubmodelSet::heuristic(&v.chord_vocabulary(), &v.key_vocabulary());
    models.chord_classifier = ChordClassifier::Precomputed {
        vocab_len: len,
        ranges: vec![RangeDistribution {
            range: r(0, 2),
            log_probs: vec![f64::NEG_INFINITY; len],
        }],
    };
    let engine = HarmonicEngine::new(&config, models).unwrap();
    let record = PieceRecord {
        id: "broken".into(),
        frames: c_then_g().timeline().frames().to_vec(),
        chords: vec![ChordRecord {
            start: 0,
            root: "C".into(),
            chord_type: "M".into(),
            figbass: String::new(),
            key: KeyRecord {
                tonic: "C".into(),
                mode: KeyMode::Major,
            },
            applied_to: None,
        }],
    };
    let piece = engine.load_piece(record).unwrap();
    let summary = engine.evaluate(&[piece], RangeSource::Detected).unwrap();
    assert!(summary.pieces.is_empty());
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].piece_id, "broken");
}

#[test]
fn reused_piece_id_with_new_content_is_decoded_afresh() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("decodes.db");
    let config = HarmonicConfig {
        vocabulary: vocabulary(),
        paths: PathsConfig {
            cache_db: Some(db.clone()),
        },
        ..HarmonicConfig::default()
    };
    let engine = HarmonicEngine::heuristic(&config).unwrap();
    let same_id = |n: usize| {
        let frames = (0..n).map(|i| frame(i, &[48, 60, 64, 67])).collect();
        Piece::unannotated("same-id", Timeline::new(frames).unwrap())
    };

    let short = engine.analyze(&same_id(4), 1).unwrap();
    check_tiling(&short[0].chord_ranges(), 4).unwrap();

    let long = engine.analyze(&same_id(6), 1).unwrap();
    check_tiling(&long[0].chord_ranges(), 6).unwrap();
    assert_eq!(engine.analyze(&same_id(6), 1).unwrap(), long);
    drop(engine);

    assert_eq!(DecodeCache::open(&db).unwrap().len().unwrap(), 2);
}

#[test]
fn evaluation_skips_unannotated_pieces() {
    let config = HarmonicConfig {
        vocabulary: vocabulary(),
        ..HarmonicConfig::default()
    };
    let engine = HarmonicEngine::heuristic(&config).unwrap();
    let key = KeyRecord {
        tonic: "C".into(),
        mode: KeyMode::Major,
    };
    let annotated = PieceRecord {
        id: "cg".into(),
        frames: c_then_g().timeline().frames().to_vec(),
        chords: vec![
            ChordRecord {
                start: 0,
                root: "C".into(),
                chord_type: "M".into(),
                figbass: String::new(),
                key: key.clone(),
                applied_to: None,
            },
            ChordRecord {
                start: 2,
                root: "G".into(),
                chord_type: "M".into(),
                figbass: String::new(),
                key,
                applied_to: None,
            },
        ],
    };
    let bare = PieceRecord {
        id: "no-chords".into(),
        frames: c_then_g().timeline().frames().to_vec(),
        chords: Vec::new(),
    };
    let pieces = vec![
        engine.load_piece(bare).unwrap(),
        engine.load_piece(annotated).unwrap(),
    ];

    for source in [RangeSource::Detected, RangeSource::Oracle] {
        let summary = engine.evaluate(&pieces, source).unwrap();
        assert_eq!(summary.pieces.len(), 1);
        assert_eq!(summary.pieces[0].piece_id, "cg");
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].piece_id, "no-chords");
        assert_eq!(summary.range_recall(), 1.0);
    }
}

#[test]
fn oracle_decode_of_unannotated_piece_is_per_piece() {
    let v = vocabulary();
    let models = SubmodelSet::heuristic(&v.chord_vocabulary(), &v.key_vocabulary());
    let err = decoder(DecoderConfig::default())
        .decode_with(&c_then_g(), &models, RangeSource::Oracle, 1, &mut RecordingObserver::default())
        .unwrap_err();
    assert!(matches!(err, DecodeError::MissingAnnotations { ref piece } if piece == "cg"));
    assert!(err.is_per_piece());
}
