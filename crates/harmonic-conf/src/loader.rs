//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, HarmonicConfig};
use harmonic_core::PitchType;
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided it replaces the local override. Unlike the
/// standard locations it is returned even when missing, so that reading
/// it reports the error.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/harmonic/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("harmonic/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        files.push(path.to_path_buf());
        return files;
    }

    let local = PathBuf::from("harmonic.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a file as a raw TOML table.
pub fn load_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_table(&contents, path)
}

fn parse_table(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    contents
        .parse()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Merge `overlay` into `base`. Nested tables merge key by key; any other
/// value in `overlay` replaces the one in `base`.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Turn a merged table into a config. Missing fields take their defaults.
pub fn config_from_table(table: toml::Table, origin: &Path) -> Result<HarmonicConfig, ConfigError> {
    let mut config: HarmonicConfig = toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;

    if let Some(path) = config.paths.cache_db.take() {
        config.paths.cache_db = Some(expand_path(&path.to_string_lossy()));
    }
    Ok(config)
}

/// Apply `HARMONIC_*` environment variable overrides to config.
pub fn apply_env_overrides(
    config: &mut HarmonicConfig,
    sources: &mut ConfigSources,
) -> Result<(), ConfigError> {
    apply_overrides_from(config, sources, env::vars())
}

/// Apply overrides from an arbitrary variable list.
///
/// Unknown variables are ignored. A recognized variable with an unparsable
/// value is an error rather than being silently skipped.
pub fn apply_overrides_from<I>(
    config: &mut HarmonicConfig,
    sources: &mut ConfigSources,
    vars: I,
) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut vars: Vec<(String, String)> = vars
        .into_iter()
        .filter(|(k, _)| k.starts_with("HARMONIC_"))
        .collect();
    vars.sort();

    for (key, value) in vars {
        let decoder = &mut config.decoder;
        let applied = match key.as_str() {
            "HARMONIC_MIN_CHORD_CHANGE_PROB" => {
                decoder.min_chord_change_prob = parse_var(&key, &value)?;
                true
            }
            "HARMONIC_MAX_NO_CHORD_CHANGE_PROB" => {
                decoder.max_no_chord_change_prob = parse_var(&key, &value)?;
                true
            }
            "HARMONIC_MIN_KEY_CHANGE_PROB" => {
                decoder.min_key_change_prob = parse_var(&key, &value)?;
                true
            }
            "HARMONIC_MAX_NO_KEY_CHANGE_PROB" => {
                decoder.max_no_key_change_prob = parse_var(&key, &value)?;
                true
            }
            "HARMONIC_BEAM_WIDTH" => {
                decoder.beam_width = parse_var(&key, &value)?;
                true
            }
            "HARMONIC_MAX_CHORD_BRANCHING_FACTOR" => {
                decoder.max_chord_branching_factor = parse_var(&key, &value)?;
                true
            }
            "HARMONIC_MAX_KEY_BRANCHING_FACTOR" => {
                decoder.max_key_branching_factor = parse_var(&key, &value)?;
                true
            }
            "HARMONIC_PITCH_TYPE" => {
                config.vocabulary.pitch_type = match value.to_ascii_lowercase().as_str() {
                    "midi" => PitchType::Midi,
                    "tpc" => PitchType::Tpc,
                    _ => {
                        return Err(ConfigError::Invalid(format!(
                            "{key}: unknown pitch type {value:?}"
                        )))
                    }
                };
                true
            }
            "HARMONIC_CACHE_DB" => {
                config.paths.cache_db = Some(expand_path(&value));
                true
            }
            "HARMONIC_LOG_LEVEL" => {
                config.logging.level = value;
                true
            }
            _ => false,
        };

        if applied {
            sources.env_overrides.push(key);
        }
    }

    Ok(())
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{key}: cannot parse {value:?}")))
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        match directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            Some(home) => home.join(stripped),
            None => PathBuf::from(path),
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        let (var_name, rest) = match stripped.find('/') {
            Some(pos) => (&stripped[..pos], Some(&stripped[pos + 1..])),
            None => (stripped, None),
        };
        match (env::var(var_name), rest) {
            (Ok(value), Some(rest)) => PathBuf::from(value).join(rest),
            (Ok(value), None) => PathBuf::from(value),
            (Err(_), _) => PathBuf::from(path),
        }
    } else {
        PathBuf::from(path)
    }
}
