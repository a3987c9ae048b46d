//! Configuration loading for the harmonic analysis decoder.
//!
//! Settings come from layered TOML files plus `HARMONIC_*` environment
//! variables. Every section and field is optional; anything missing takes
//! its compiled default.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/harmonic/config.toml` (system)
//! 2. `~/.config/harmonic/config.toml` (user)
//! 3. `./harmonic.toml`, or the path given with `--config`
//! 4. Environment variables (`HARMONIC_*`)
//!
//! # Example Config
//!
//! ```toml
//! [decoder]
//! min_chord_change_prob = 0.25
//! max_no_chord_change_prob = 0.45
//! beam_width = 50
//! max_chord_branching_factor = 5
//! max_key_branching_factor = 2
//! min_key_change_prob = 0.05
//! max_no_key_change_prob = 0.75
//! hash_length = 5
//!
//! [vocabulary]
//! pitch_type = "midi"
//! use_inversions = true
//!
//! [paths]
//! cache_db = "~/.cache/harmonic/decodes.db"
//!
//! [logging]
//! level = "info"
//! ```

pub mod decoder;
pub mod infra;
pub mod loader;

pub use decoder::DecoderConfig;
pub use infra::{LoggingConfig, PathsConfig, VocabularyConfig};
pub use loader::{discover_config_files_with_override, ConfigSources};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Complete harmonic configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HarmonicConfig {
    #[serde(default)]
    pub decoder: DecoderConfig,

    #[serde(default)]
    pub vocabulary: VocabularyConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl HarmonicConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration with `config_path` standing in for `./harmonic.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and report which files and variables contributed.
    ///
    /// The result is validated; inconsistent thresholds are an error here
    /// rather than at decode time.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        for path in loader::discover_config_files_with_override(config_path) {
            let table = loader::load_table(&path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path);
        }

        let origin = sources
            .files
            .last()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("<defaults>"));
        let mut config = loader::config_from_table(merged, &origin)?;

        loader::apply_env_overrides(&mut config, &mut sources)?;
        config.validate()?;

        Ok((config, sources))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.decoder.validate()
    }

    /// Identity of everything that changes decode output, for cache keys.
    pub fn fingerprint(&self) -> String {
        format!(
            "{} {}",
            self.vocabulary.fingerprint(),
            self.decoder.fingerprint()
        )
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        let d = &self.decoder;
        let mut output = String::new();

        output.push_str("# Harmonic Configuration\n\n");

        output.push_str("[decoder]\n");
        output.push_str(&format!("min_chord_change_prob = {:?}\n", d.min_chord_change_prob));
        output.push_str(&format!(
            "max_no_chord_change_prob = {:?}\n",
            d.max_no_chord_change_prob
        ));
        output.push_str(&format!("beam_width = {}\n", d.beam_width));
        output.push_str(&format!(
            "max_chord_branching_factor = {}\n",
            d.max_chord_branching_factor
        ));
        output.push_str(&format!(
            "max_key_branching_factor = {}\n",
            d.max_key_branching_factor
        ));
        output.push_str(&format!("min_key_change_prob = {:?}\n", d.min_key_change_prob));
        output.push_str(&format!(
            "max_no_key_change_prob = {:?}\n",
            d.max_no_key_change_prob
        ));
        if let Some(n) = d.hash_length {
            output.push_str(&format!("hash_length = {n}\n"));
        }
        if let Some(n) = d.max_rounds {
            output.push_str(&format!("max_rounds = {n}\n"));
        }

        output.push_str("\n[vocabulary]\n");
        output.push_str(&format!("pitch_type = \"{}\"\n", self.vocabulary.pitch_type));
        output.push_str(&format!(
            "use_inversions = {}\n",
            self.vocabulary.use_inversions
        ));
        output.push_str(&format!("use_relative = {}\n", self.vocabulary.use_relative));

        output.push_str("\n[paths]\n");
        if let Some(db) = &self.paths.cache_db {
            output.push_str(&format!("cache_db = \"{}\"\n", db.display()));
        }

        output.push_str("\n[logging]\n");
        output.push_str(&format!("level = \"{}\"\n", self.logging.level));

        output
    }
}
