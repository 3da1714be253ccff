//! Command implementations.

pub mod config;
pub mod count;

use std::path::Path;

use tally_core::{Config, ConfigError};

/// Load the config from `--config` when given, else from the default location.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

/// Where `tally config` reads and writes.
pub fn config_path(path: Option<&Path>) -> std::path::PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(Config::default_path)
}
