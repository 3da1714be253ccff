//! Name-keyed registry of model build functions.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::Config;
use crate::error::ModelError;

use super::{CountingModel, Device};

/// Signature of a model build function.
pub type BuildFn = fn(&BuildArgs) -> Result<Box<dyn CountingModel>, ModelError>;

/// Everything a build function gets to construct a model.
#[derive(Debug, Clone)]
pub struct BuildArgs {
    /// Checkpoint file holding the network
    pub checkpoint: PathBuf,

    /// Caption tokenizer (`tokenizer.json`)
    pub tokenizer: PathBuf,

    /// Requested execution device
    pub device: Device,

    /// Threads for intra-op parallelism (0 lets the runtime decide)
    pub num_workers: usize,
}

impl BuildArgs {
    /// Gather build arguments from config plus runtime choices.
    pub fn from_config(config: &Config, device: Device, num_workers: usize) -> Self {
        Self {
            checkpoint: config.checkpoint_path(),
            tokenizer: config.tokenizer_path(),
            device,
            num_workers,
        }
    }
}

/// Maps model names to build functions.
#[derive(Clone, Default)]
pub struct ModelRegistry {
    builders: BTreeMap<String, BuildFn>,
}

impl ModelRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in backends.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("groundingdino", super::onnx::build);
        registry
    }

    /// Register (or replace) a build function.
    pub fn register(&mut self, name: impl Into<String>, build: BuildFn) {
        self.builders.insert(name.into(), build);
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.builders.keys().map(String::as_str).collect()
    }

    /// Build the model registered under `name`.
    pub fn build(&self, name: &str, args: &BuildArgs) -> Result<Box<dyn CountingModel>, ModelError> {
        let build = self
            .builders
            .get(name)
            .ok_or_else(|| ModelError::UnknownModel {
                name: name.to_string(),
                registered: self.names().join(", "),
            })?;
        tracing::debug!("Building model {:?} on {}", name, args.device);
        build(args)
    }
}
