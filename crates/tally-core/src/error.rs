//! Error types for the Tally counting pipeline.
//!
//! Errors are organized by stage so that messages carry the context a user
//! needs (file paths, offending keys, keyword names).

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for Tally operations.
#[derive(Error, Debug)]
pub enum TallyError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Keyword / prediction filtering errors
    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    /// Model building or inference errors
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Heatmap rendering errors
    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// A `key=value` override could not be applied
    #[error("Invalid override {entry:?}: {message}")]
    Override { entry: String, message: String },

    /// A config key shadows a command-line option
    #[error("Key {key} can be set by command-line arguments only")]
    ReservedKey { key: String },
}

/// Keyword and prediction filtering errors.
#[derive(Error, Debug, PartialEq)]
pub enum FilterError {
    /// Keyword does not occur in the input text (at or after the previous match)
    #[error("Only specify keywords in the input text! {keyword:?} was not found")]
    InvalidKeyword { keyword: String },

    /// Token index points past the model's logit columns
    #[error("Token index {index} out of range for {columns} logit columns")]
    TokenOutOfRange { index: usize, columns: usize },

    /// Model output carried no batch entries
    #[error("Model output is empty")]
    EmptyOutput,
}

/// Model registry, loading and inference errors.
#[derive(Error, Debug)]
pub enum ModelError {
    /// No build function registered under this name
    #[error("Unknown model {name:?} (registered: {registered})")]
    UnknownModel { name: String, registered: String },

    /// Checkpoint or tokenizer could not be loaded
    #[error("Failed to load {path}: {message}")]
    Load { path: PathBuf, message: String },

    /// Forward pass failed
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Model did not produce a required output
    #[error("Model did not produce {0}")]
    MissingOutput(String),

    /// Output tensor had an unexpected shape
    #[error("Unexpected shape for {name}: {shape:?}")]
    Shape { name: String, shape: Vec<i64> },
}

/// Heatmap rendering errors.
#[derive(Error, Debug)]
pub enum RenderError {
    /// PNG encoding failed
    #[error("Failed to encode heatmap: {0}")]
    Encode(#[from] image::ImageError),
}

/// Convenience type alias for Tally results.
pub type Result<T> = std::result::Result<T, TallyError>;
