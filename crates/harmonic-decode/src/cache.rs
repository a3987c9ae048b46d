use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use harmonic_core::Piece;

use crate::analysis::DecodedAnalysis;
use crate::submodels::SubmodelSet;

/// A stored decode: the n-best analyses for one piece under one setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedDecode {
    pub piece_id: String,
    pub content_hash: String,
    pub fingerprint: String,
    pub version: u32,
    /// The `n_best` the decode was asked for. Fewer analyses than this
    /// means the final beam held no more.
    pub requested: usize,
    pub created_at: String,
    pub analyses: Vec<DecodedAnalysis>,
}

impl CachedDecode {
    /// Whether this entry can answer a request for `n_best` analyses.
    pub fn satisfies(&self, n_best: usize) -> bool {
        self.analyses.len() >= n_best || self.analyses.len() < self.requested
    }
}

/// BLAKE3 digest of a piece's timeline and annotations, so a reused id
/// with different content misses.
pub fn piece_content_hash(piece: &Piece) -> Result<String> {
    let json = serde_json::to_vec(&(piece.timeline(), piece.chords(), piece.keys()))
        .context("serializing piece for content hash")?;
    Ok(blake3::hash(&json).to_hex().to_string())
}

/// Identifies the decoder setup a result was computed under: settings,
/// vocabulary and the exact submodel parameters.
pub fn decode_fingerprint(settings: &str, models: &SubmodelSet) -> Result<String> {
    let json = serde_json::to_vec(models).context("serializing submodels for fingerprint")?;
    let digest = blake3::hash(&json);
    Ok(format!("{settings}|models={}", hex::encode(&digest.as_bytes()[..16])))
}

/// SQLite-backed cache of decoded analyses.
///
/// Keyed by `(piece_id, content_hash, fingerprint, version)`. Changed piece
/// content, config or models miss, and so does an algorithm version bump.
pub struct DecodeCache {
    connection: Mutex<Connection>,
}

impl DecodeCache {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating cache directory {}", parent.display()))?;
        }
        let connection = Connection::open(db_path).context("opening decode cache db")?;

        connection
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS decodes (
                    piece_id     TEXT NOT NULL,
                    content_hash TEXT NOT NULL,
                    fingerprint  TEXT NOT NULL,
                    version      INTEGER NOT NULL,
                    requested    INTEGER NOT NULL,
                    created_at   TEXT NOT NULL,
                    result_json  TEXT NOT NULL,
                    PRIMARY KEY (piece_id, content_hash, fingerprint, version)
                );",
            )
            .context("creating cache tables")?;

        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    pub fn get(
        &self,
        piece_id: &str,
        content_hash: &str,
        fingerprint: &str,
        version: u32,
    ) -> Result<Option<CachedDecode>> {
        let conn = self
            .connection
            .lock()
            .map_err(|_| anyhow::anyhow!("cache mutex poisoned"))?;

        let mut stmt = conn.prepare_cached(
            "SELECT requested, created_at, result_json FROM decodes
             WHERE piece_id = ?1 AND content_hash = ?2 AND fingerprint = ?3 AND version = ?4",
        )?;

        let result = stmt.query_row(
            rusqlite::params![piece_id, content_hash, fingerprint, version],
            |row| {
                let requested: i64 = row.get(0)?;
                let created_at: String = row.get(1)?;
                let json: String = row.get(2)?;
                Ok((requested, created_at, json))
            },
        );

        match result {
            Ok((requested, created_at, json)) => {
                let analyses: Vec<DecodedAnalysis> =
                    serde_json::from_str(&json).context("deserializing cached decode")?;
                Ok(Some(CachedDecode {
                    piece_id: piece_id.to_string(),
                    content_hash: content_hash.to_string(),
                    fingerprint: fingerprint.to_string(),
                    version,
                    requested: requested as usize,
                    created_at,
                    analyses,
                }))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e).context("querying decode cache"),
        }
    }

    pub fn put(
        &self,
        piece_id: &str,
        content_hash: &str,
        fingerprint: &str,
        version: u32,
        requested: usize,
        analyses: &[DecodedAnalysis],
    ) -> Result<CachedDecode> {
        let json = serde_json::to_string(analyses).context("serializing decode for cache")?;
        let now = chrono::Utc::now().to_rfc3339();

        let conn = self
            .connection
            .lock()
            .map_err(|_| anyhow::anyhow!("cache mutex poisoned"))?;

        conn.execute(
            "INSERT OR REPLACE INTO decodes
                (piece_id, content_hash, fingerprint, version, requested, created_at, result_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![piece_id, content_hash, fingerprint, version, requested as i64, now, json],
        )?;

        Ok(CachedDecode {
            piece_id: piece_id.to_string(),
            content_hash: content_hash.to_string(),
            fingerprint: fingerprint.to_string(),
            version,
            requested,
            created_at: now,
            analyses: analyses.to_vec(),
        })
    }

    /// Number of stored decodes.
    pub fn len(&self) -> Result<usize> {
        let conn = self
            .connection
            .lock()
            .map_err(|_| anyhow::anyhow!("cache mutex poisoned"))?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM decodes", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{DecodedChord, DecodedKey};
    use harmonic_core::{ChordRange, ChordVocabulary, KeyVocabulary, PitchType};
    use tempfile::TempDir;

    fn sample() -> Vec<DecodedAnalysis> {
        vec![DecodedAnalysis {
            piece_id: "bwv846".into(),
            chords: vec![DecodedChord {
                label: 0,
                range: ChordRange { start: 0, end: 4 },
                key: 0,
            }],
            keys: vec![DecodedKey { label: 0, start: 0 }],
            log_prob: -1.5,
        }]
    }

    #[test]
    fn cache_miss_returns_none() {
        let dir = TempDir::new().unwrap();
        let cache = DecodeCache::open(&dir.path().join("test.db")).unwrap();
        assert!(cache.get("nonexistent", "h", "fp", 1).unwrap().is_none());
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn cache_roundtrip() {
        let dir = TempDir::new().unwrap();
        let cache = DecodeCache::open(&dir.path().join("nested/test.db")).unwrap();
        cache.put("bwv846", "h", "fp", 1, 1, &sample()).unwrap();

        let hit = cache.get("bwv846", "h", "fp", 1).unwrap().unwrap();
        assert_eq!(hit.analyses, sample());
        assert_eq!(hit.requested, 1);
        assert_eq!(cache.len().unwrap(), 1);
    }

    #[test]
    fn content_fingerprint_or_version_mismatch_is_miss() {
        let dir = TempDir::new().unwrap();
        let cache = DecodeCache::open(&dir.path().join("test.db")).unwrap();
        cache.put("bwv846", "h", "fp", 1, 1, &sample()).unwrap();

        assert!(cache.get("bwv846", "changed", "fp", 1).unwrap().is_none());
        assert!(cache.get("bwv846", "h", "other", 1).unwrap().is_none());
        assert!(cache.get("bwv846", "h", "fp", 2).unwrap().is_none());
    }

    #[test]
    fn short_complete_entry_satisfies_larger_requests() {
        let dir = TempDir::new().unwrap();
        let cache = DecodeCache::open(&dir.path().join("test.db")).unwrap();

        // Asked for 5, the final beam held 1: that is every analysis there is.
        let complete = cache.put("bwv846", "h", "fp", 1, 5, &sample()).unwrap();
        assert!(complete.satisfies(1));
        assert!(complete.satisfies(10));

        // Asked for 1, got 1: more may exist.
        let truncated = cache.put("bwv846", "h", "fp", 1, 1, &sample()).unwrap();
        assert!(truncated.satisfies(1));
        assert!(!truncated.satisfies(2));
    }

    #[test]
    fn content_hash_tracks_timeline() {
        let frame = |i: i64| {
            harmonic_core::Frame::new(
                harmonic_core::Rational::new(i, 1),
                harmonic_core::Rational::new(1, 1),
                harmonic_core::OnsetLevel::Beat,
                vec![60, 64, 67],
            )
        };
        let piece = |n: i64| {
            Piece::unannotated("same-id", harmonic_core::Timeline::new((0..n).map(frame).collect()).unwrap())
        };

        let four = piece_content_hash(&piece(4)).unwrap();
        assert_eq!(four, piece_content_hash(&piece(4)).unwrap());
        assert_ne!(four, piece_content_hash(&piece(6)).unwrap());
    }

    #[test]
    fn fingerprint_tracks_models() {
        let chords = ChordVocabulary::new(PitchType::Midi, false, false);
        let keys = KeyVocabulary::new(PitchType::Midi);
        let a = SubmodelSet::heuristic(&chords, &keys);
        let mut b = a.clone();
        b.key_change = crate::submodels::KeyChangeDetector::Constant { prob: 0.3 };

        let fa = decode_fingerprint("cfg", &a).unwrap();
        assert_eq!(fa, decode_fingerprint("cfg", &a).unwrap());
        assert_ne!(fa, decode_fingerprint("cfg", &b).unwrap());
    }
}
