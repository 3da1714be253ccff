//! Run setup: config loading and overrides, device choice, prompt assembly.

use std::path::Path;

use anyhow::Context;
use clap::{Args, Command};
use image::DynamicImage;
use tally_core::config::BUILTIN_OVERRIDES;
use tally_core::{Config, Prompt, PromptSet};

use super::CountArgs;

/// Every option name a config key may not shadow.
pub fn reserved_names() -> Vec<String> {
    let command = CountArgs::augment_args(Command::new("count"));
    command
        .get_arguments()
        .map(|arg| arg.get_id().as_str().to_string())
        .chain(crate::GLOBAL_OPTIONS.iter().map(|s| s.to_string()))
        .collect()
}

/// Load the config and layer the built-in and `--options` overrides on top.
pub fn load_config(args: &CountArgs, config_file: Option<&Path>) -> anyhow::Result<Config> {
    let mut config = crate::cli::load_config(config_file)?;

    config.apply_overrides(BUILTIN_OVERRIDES)?;
    config.apply_overrides(&args.options)?;
    config.check_reserved_keys(&reserved_names())?;

    if let Some(ref path) = args.pretrain_model_path {
        config.model.checkpoint = path.clone();
    }

    config.validate()?;
    Ok(config)
}

/// Assemble the exemplar prompt set, if any exemplar input was given.
///
/// Boxes from `--exemplar` are appended after those read from `--prompts`.
/// Without `--exemplar-image`, exemplars refer to the query image.
pub fn prompt_set(args: &CountArgs, image: &DynamicImage) -> anyhow::Result<Option<PromptSet>> {
    if args.exemplar.is_empty() && args.prompts.is_none() && args.exemplar_image.is_none() {
        return Ok(None);
    }

    let mut points: Vec<Prompt> = match &args.prompts {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read prompts file {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid prompts in {}", path.display()))?
        }
        None => Vec::new(),
    };
    points.extend(
        args.exemplar
            .iter()
            .map(|b| Prompt::bbox(b.x1, b.y1, b.x2, b.y2)),
    );

    let exemplar_image = match &args.exemplar_image {
        Some(path) => image::open(path)
            .with_context(|| format!("Failed to open exemplar image {}", path.display()))?,
        None => image.clone(),
    };

    Ok(Some(PromptSet {
        image: exemplar_image,
        points,
    }))
}
