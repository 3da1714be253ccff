//! Configuration management for Tally.
//!
//! Configuration is loaded from a TOML file (platform config dir by default),
//! then runtime `key=value` overrides are merged on top. Keys that shadow a
//! command-line option are rejected, see [`Config::check_reserved_keys`].

mod overrides;
mod types;
mod validate;

pub use overrides::parse_override;
pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Override applied to every loaded config before user overrides.
pub const BUILTIN_OVERRIDES: &[&str] =
    &["model.text_encoder_type=\"checkpoints/bert-base-uncased\""];

/// Tokenizer file expected inside the text encoder directory.
const TOKENIZER_FILENAME: &str = "tokenizer.json";

/// Root configuration structure for Tally.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Detector settings
    pub model: ModelConfig,

    /// Image transform settings
    pub transform: TransformConfig,

    /// Heatmap rendering settings
    pub render: RenderConfig,

    /// Report output settings
    pub report: ReportConfig,

    /// Logging settings
    pub logging: LoggingConfig,

    /// Every key name seen in the source file and overrides, known or not
    #[serde(skip)]
    raw_keys: Vec<String>,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let table: toml::Table = toml::from_str(&content)?;
        let root = toml::Value::Table(table);

        let mut raw_keys = Vec::new();
        overrides::collect_keys(&root, &mut raw_keys);

        let mut config: Config = root.try_into()?;
        config.raw_keys = raw_keys;
        config.validate()?;
        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.tally.tally/config.toml
    /// - Linux: ~/.config/tally/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\tally\config\config.toml
    ///
    /// Falls back to ~/.tally/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "tally", "tally")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".tally").join("config.toml")
            })
    }

    /// Get the resolved model directory path (with ~ expansion).
    pub fn model_dir(&self) -> PathBuf {
        let path_str = self.general.model_dir.to_string_lossy();
        let expanded = shellexpand::tilde(&path_str);
        PathBuf::from(expanded.into_owned())
    }

    /// Resolved checkpoint path. Relative paths land under `model_dir`.
    pub fn checkpoint_path(&self) -> PathBuf {
        self.resolve(&self.model.checkpoint)
    }

    /// Resolved path of the caption tokenizer (`{text_encoder_type}/tokenizer.json`).
    pub fn tokenizer_path(&self) -> PathBuf {
        self.resolve(Path::new(&self.model.text_encoder_type))
            .join(TOKENIZER_FILENAME)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned());
        if expanded.is_absolute() {
            expanded
        } else {
            self.model_dir().join(expanded)
        }
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}
