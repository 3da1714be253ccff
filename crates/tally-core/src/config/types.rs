//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory that relative checkpoint and tokenizer paths resolve against
    pub model_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("~/.tally/models"),
        }
    }
}

/// Detector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Registry name of the network to build
    pub modelname: String,

    /// Checkpoint file (ONNX graph with weights)
    pub checkpoint: PathBuf,

    /// Directory holding the text encoder's `tokenizer.json`
    pub text_encoder_type: String,

    /// Seed for every random choice made while building and preprocessing
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            modelname: "groundingdino".to_string(),
            checkpoint: PathBuf::from("checkpoint_best_regular.onnx"),
            text_encoder_type: "bert-base-uncased".to_string(),
            seed: 42,
        }
    }
}

/// Image transform settings (resize + normalize).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Candidate lengths for the shorter image side; one is picked per call
    pub sizes: Vec<u32>,

    /// Upper bound for the longer image side
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u32>,

    /// Per-channel normalization mean (RGB, on the 0..1 scale)
    pub mean: [f32; 3],

    /// Per-channel normalization std (RGB, on the 0..1 scale)
    pub std: [f32; 3],
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            sizes: vec![800],
            max_size: Some(1333),
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
        }
    }
}

/// Heatmap rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Opacity of the density overlay
    pub alpha: f32,

    /// Gaussian sigma is `image_width / sigma_divisor` (integer division)
    pub sigma_divisor: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            alpha: 0.7,
            sigma_divisor: 200,
        }
    }
}

/// Report output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Pretty-print JSON output
    pub pretty: bool,

    /// Include the per-token confidence matrix in reports
    pub include_logits: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            pretty: true,
            include_logits: false,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log style: "pretty" or "json"
    pub style: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            style: "pretty".to_string(),
        }
    }
}
