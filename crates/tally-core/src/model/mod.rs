//! The detector boundary.
//!
//! The counting network itself is opaque: anything that turns an image
//! batch, exemplar boxes and a caption into per-token logits and boxes can
//! implement [`CountingModel`]. Implementations are looked up by name in the
//! [`registry`]; the ONNX Runtime backend lives in [`onnx`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use tally_core::model::{BuildArgs, Device, ModelRegistry};
//!
//! let args = BuildArgs::from_config(&config, Device::Cpu, 4);
//! let model = ModelRegistry::with_defaults().build(&config.model.modelname, &args)?;
//! let output = model.forward(&input)?;
//! ```

pub mod onnx;
pub mod registry;

use std::fmt;
use std::str::FromStr;

use ndarray::{Array2, Array3, Array4};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

pub use self::onnx::OnnxCountingModel;
pub use self::registry::{BuildArgs, ModelRegistry};

/// Where the forward pass runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    Cuda,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda => write!(f, "cuda"),
        }
    }
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cpu" => Ok(Device::Cpu),
            "cuda" | "gpu" => Ok(Device::Cuda),
            other => Err(format!("unknown device {other:?} (expected cpu or cuda)")),
        }
    }
}

/// CUDA when the runtime can use it, CPU otherwise.
pub fn get_device() -> Device {
    if onnx::cuda_available() {
        Device::Cuda
    } else {
        Device::Cpu
    }
}

/// One forward-pass worth of model inputs, batch-first.
#[derive(Debug, Clone)]
pub struct ModelInput {
    /// `[B, 3, H, W]` normalized images
    pub images: Array4<f32>,

    /// `[B, 3, H', W']` normalized images the exemplars were drawn on
    pub exemplar_images: Array4<f32>,

    /// Per image, `N × 4` exemplar boxes in transformed pixel coordinates
    pub exemplars: Vec<Array2<f32>>,

    /// Per image, class labels of the exemplars
    pub labels: Vec<Vec<i64>>,

    /// Per image, the text caption
    pub captions: Vec<String>,
}

impl ModelInput {
    pub fn batch_size(&self) -> usize {
        self.images.shape()[0]
    }
}

/// Raw model output, batch-first.
#[derive(Debug, Clone)]
pub struct ModelOutput {
    /// `[B, Q, T]` per-instance, per-token logits (pre-sigmoid)
    pub pred_logits: Array3<f32>,

    /// `[B, Q, 4]` normalized `(cx, cy, w, h)` boxes
    pub pred_boxes: Array3<f32>,

    /// Per image, the word index of each caption token
    pub word_ids: Vec<Vec<Option<usize>>>,
}

/// A network that counts/detects instances given text and exemplars.
pub trait CountingModel {
    /// Run one inference-only forward pass.
    fn forward(&self, input: &ModelInput) -> Result<ModelOutput, ModelError>;
}

impl<M: CountingModel + ?Sized> CountingModel for Box<M> {
    fn forward(&self, input: &ModelInput) -> Result<ModelOutput, ModelError> {
        (**self).forward(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_from_str() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("CUDA".parse::<Device>().unwrap(), Device::Cuda);
        assert!("tpu".parse::<Device>().is_err());
    }

    #[test]
    fn test_device_display_roundtrips() {
        for device in [Device::Cpu, Device::Cuda] {
            assert_eq!(device.to_string().parse::<Device>().unwrap(), device);
        }
    }
}
