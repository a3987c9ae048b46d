//! harmonic - decode and evaluate joint key/chord analyses
//!
//! Subcommands:
//! - `harmonic decode <bundle>` - Decode every piece in a JSON bundle
//! - `harmonic eval <bundle>` - Decode annotated pieces and score them
//! - `harmonic config show` - Print the effective configuration
//! - `harmonic config sources` - List contributing files and env vars

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "harmonic")]
#[command(about = "Joint key and chord decoding for symbolic music")]
#[command(version)]
struct Cli {
    /// Config file used in place of ./harmonic.toml
    #[arg(short, long, global = true, env = "HARMONIC_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode every piece in a bundle and print the analyses as JSON
    Decode {
        /// Bundle JSON: {"pieces": [...], "models": {...}}
        bundle: PathBuf,

        /// Analyses to keep per piece
        #[arg(short, long, default_value = "1")]
        n_best: usize,

        /// Take chord boundaries from the annotations instead of the detector
        #[arg(long)]
        oracle: bool,

        /// Print label indices instead of label strings
        #[arg(long)]
        raw: bool,

        /// Skip the decode cache even if one is configured
        #[arg(long)]
        no_cache: bool,

        /// Write every intermediate score to this JSON file
        #[arg(long)]
        trace: Option<PathBuf>,
    },

    /// Decode annotated pieces and report accuracy
    Eval {
        /// Bundle JSON with annotated pieces
        bundle: PathBuf,

        /// Take chord boundaries from the annotations instead of the detector
        #[arg(long)]
        oracle: bool,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// List the files and environment variables that were applied
    Sources,
}

fn init_logging(level: &str) -> Result<()> {
    let directive: tracing_subscriber::filter::Directive = level
        .parse()
        .with_context(|| format!("invalid log level {level:?}"))?;
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, sources) = harmonic_conf::HarmonicConfig::load_with_sources_from(cli.config.as_deref())
        .context("loading configuration")?;
    init_logging(&config.logging.level)?;

    match cli.command {
        Commands::Decode {
            bundle,
            n_best,
            oracle,
            raw,
            no_cache,
            trace,
        } => {
            commands::decode(
                &config,
                &bundle,
                commands::DecodeOptions {
                    n_best,
                    oracle,
                    raw,
                    no_cache,
                    trace,
                },
            )?;
        }
        Commands::Eval { bundle, oracle } => {
            commands::eval(&config, &bundle, oracle)?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => print!("{}", config.to_toml()),
            ConfigAction::Sources => commands::print_sources(&sources),
        },
    }

    Ok(())
}
