//! Tally CLI - count objects in an image from text and visual exemplars.
//!
//! The object class is described by a caption, by exemplar boxes drawn on an
//! image, or by both. Tally reports how many instances it finds and can render
//! a density heatmap of where they are.
//!
//! # Usage
//!
//! ```bash
//! # Count by text
//! tally count apples.jpg --text apple
//!
//! # Count by two exemplar boxes, save a heatmap
//! tally count apples.jpg --exemplar 10,20,60,80 --exemplar 120,40,170,95 --heatmap heat.png
//!
//! # Override config values for one run
//! tally count apples.jpg --text apple --options render.alpha=0.5 model.seed=7
//!
//! # View configuration
//! tally config show
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// Tally - count objects in an image from a text prompt and visual exemplars.
#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, env = "TALLY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Count the instances of an object in an image
    Count(cli::count::CountArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

/// Names of the global options, which config keys may not shadow either.
pub(crate) const GLOBAL_OPTIONS: &[&str] = &["verbose", "json_logs", "config"];

/// Config the command runs with. For `count` this includes the built-in and
/// `--options` overrides, so logging keys set there take effect too.
fn resolve_config(parsed: &Cli) -> anyhow::Result<tally_core::Config> {
    let config_file = parsed.config.as_deref();
    match &parsed.command {
        Commands::Count(args) => cli::count::load_config(args, config_file),
        Commands::Config(_) => Ok(cli::load_config(config_file)?),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so use eprintln for config warnings.
    let resolved = resolve_config(&cli);
    let config = match &resolved {
        Ok(config) => config.clone(),
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e:#}\n  \
                 Check your config file with `tally config path`."
            );
            tally_core::Config::default()
        }
    };
    let debug = matches!(&cli.command, Commands::Count(args) if args.debug);
    logging::init_from_config(&config, cli.verbose || debug, cli.json_logs);

    tracing::debug!("Tally v{}", tally_core::VERSION);

    match cli.command {
        Commands::Count(args) => cli::count::execute(args, resolved?),
        Commands::Config(args) => cli::config::execute(args, cli.config.as_deref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &std::path::Path, content: &str) -> String {
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        path.to_string_lossy().to_string()
    }

    #[test]
    fn test_count_options_reach_logging_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "[logging]\nlevel = \"warn\"\n");

        let parsed = Cli::try_parse_from([
            "tally",
            "--config",
            &path,
            "count",
            "apples.jpg",
            "--options",
            "logging.level=debug",
            "logging.style=json",
        ])
        .unwrap();

        let config = resolve_config(&parsed).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.style, "json");
    }

    #[test]
    fn test_config_command_uses_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "[logging]\nlevel = \"warn\"\n");

        let parsed = Cli::try_parse_from(["tally", "--config", &path, "config", "show"]).unwrap();
        assert_eq!(resolve_config(&parsed).unwrap().logging.level, "warn");
    }

    #[test]
    fn test_bad_override_surfaces_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(dir.path(), "");

        let parsed = Cli::try_parse_from([
            "tally",
            "--config",
            &path,
            "count",
            "apples.jpg",
            "--options",
            "logging.style=xml",
        ])
        .unwrap();
        assert!(resolve_config(&parsed).is_err());
    }
}
