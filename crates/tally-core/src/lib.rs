//! Tally Core - prompt-driven object counting.
//!
//! Tally counts the instances of an object class in an image. The class is
//! described by free text, by a few exemplar boxes drawn on an image, or by
//! both; a detector scores every candidate instance against the caption
//! tokens and the confident ones are counted.
//!
//! # Architecture
//!
//! ```text
//! Prompts → Exemplar boxes ┐
//! Image ─→ Transform ──────┼→ Detector → Confidence filter → Report / Heatmap
//! Text ──→ Caption ────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use tally_core::{Config, Device, Tally};
//!
//! let mut tally = Tally::build(Config::load()?, Device::Cpu, 4)?;
//! let image = image::open("apples.jpg")?;
//! let report = tally.count(&image, None, "apple", None, "")?;
//! println!("{}: {}", report.label, report.count);
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod heatmap;
pub mod inference;
pub mod label;
pub mod math;
pub mod model;
pub mod output;
pub mod prompt;
pub mod transform;
pub mod types;

pub use config::Config;
pub use error::{ConfigError, FilterError, ModelError, RenderError, Result, TallyError};
pub use heatmap::HeatmapRenderer;
pub use model::{get_device, CountingModel, Device, ModelRegistry};
pub use output::{OutputFormat, ReportWriter};
pub use transform::Transform;
pub use types::{CountReport, Detection, Detections, ExemplarBox, Prompt, PromptSet};

use std::path::Path;

use image::DynamicImage;
use ndarray::Axis;

use crate::model::BuildArgs;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Tally counter: a loaded detector plus its preprocessing and rendering.
pub struct Tally {
    config: Config,
    model: Box<dyn CountingModel>,
    transform: Transform,
    renderer: HeatmapRenderer,
    device: Device,
}

impl Tally {
    /// Build the configured model from the default registry.
    pub fn build(config: Config, device: Device, num_workers: usize) -> Result<Self> {
        Self::build_with(&ModelRegistry::with_defaults(), config, device, num_workers)
    }

    /// Build the configured model from a caller-supplied registry.
    pub fn build_with(
        registry: &ModelRegistry,
        config: Config,
        device: Device,
        num_workers: usize,
    ) -> Result<Self> {
        tracing::debug!("Initializing Tally v{}", VERSION);
        let args = BuildArgs::from_config(&config, device, num_workers);
        let model = registry.build(&config.model.modelname, &args)?;
        Ok(Self::with_model(config, model, device))
    }

    /// Wrap an already constructed model.
    pub fn with_model(config: Config, model: Box<dyn CountingModel>, device: Device) -> Self {
        let transform = Transform::from_config(&config.transform, config.model.seed);
        let renderer = HeatmapRenderer::new(config.render.clone());
        Self {
            config,
            model,
            transform,
            renderer,
            device,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Run the detector and keep the confident instances.
    pub fn detect(
        &mut self,
        image: &DynamicImage,
        text: &str,
        prompts: Option<&PromptSet>,
        keywords: &str,
    ) -> Result<Detections> {
        inference::predict(
            self.model.as_ref(),
            &mut self.transform,
            image,
            text,
            prompts,
            self.device,
            keywords,
        )
    }

    /// Summarize detections as a serializable report.
    pub fn report(
        &self,
        source: Option<&Path>,
        text: &str,
        prompts: Option<&PromptSet>,
        detections: &Detections,
    ) -> CountReport {
        let exemplars = prompts
            .map(|p| prompt::box_inputs(&p.points).len())
            .unwrap_or(0);

        let logits = self.config.report.include_logits.then(|| {
            detections
                .logits
                .axis_iter(Axis(0))
                .map(|row| row.to_vec())
                .collect()
        });

        CountReport {
            source: source.map(Path::to_path_buf),
            text: text.to_string(),
            exemplars,
            label: label::output_label(text, exemplars),
            count: detections.len(),
            detections: detections.to_vec(),
            logits,
            note: None,
        }
    }

    /// Detect and report in one step.
    pub fn count(
        &mut self,
        image: &DynamicImage,
        source: Option<&Path>,
        text: &str,
        prompts: Option<&PromptSet>,
        keywords: &str,
    ) -> Result<CountReport> {
        let detections = self.detect(image, text, prompts, keywords)?;
        Ok(self.report(source, text, prompts, &detections))
    }

    /// PNG density overlay of the detections on `image`.
    pub fn heatmap(&self, image: &DynamicImage, detections: &Detections) -> Result<Vec<u8>> {
        Ok(self
            .renderer
            .generate_heatmap(image, &detections.centers())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelInput, ModelOutput};
    use image::RgbImage;
    use ndarray::Array3;

    /// Two confident instances, one weak, regardless of input.
    struct FixedModel;

    impl CountingModel for FixedModel {
        fn forward(&self, _: &ModelInput) -> std::result::Result<ModelOutput, ModelError> {
            let logits = vec![2.0, -4.0, -4.0, -4.0, 1.5, -4.0];
            let boxes = vec![0.25, 0.25, 0.1, 0.1, 0.5, 0.5, 0.1, 0.1, 0.75, 0.75, 0.1, 0.1];
            Ok(ModelOutput {
                pred_logits: Array3::from_shape_vec((1, 3, 2), logits).unwrap(),
                pred_boxes: Array3::from_shape_vec((1, 3, 4), boxes).unwrap(),
                word_ids: vec![vec![Some(0), None]],
            })
        }
    }

    fn fixed_model(_: &BuildArgs) -> std::result::Result<Box<dyn CountingModel>, ModelError> {
        Ok(Box::new(FixedModel))
    }

    fn small_config() -> Config {
        let mut config = Config::default();
        config.transform.sizes = vec![32];
        config.transform.max_size = None;
        config
    }

    fn tally() -> Tally {
        Tally::with_model(small_config(), Box::new(FixedModel), Device::Cpu)
    }

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_count_text_only() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(64, 48));
        let report = tally()
            .count(&image, Some(Path::new("apples.jpg")), "apple", None, "")
            .unwrap();

        assert_eq!(report.count, 2);
        assert_eq!(report.exemplars, 0);
        assert_eq!(report.label, "Detected instances predicted with text.");
        assert_eq!(report.source.as_deref(), Some(Path::new("apples.jpg")));
        assert!(report.logits.is_none());
    }

    #[test]
    fn test_count_with_exemplars_and_logits() {
        let mut config = small_config();
        config.report.include_logits = true;
        let mut tally = Tally::with_model(config, Box::new(FixedModel), Device::Cpu);

        let image = DynamicImage::ImageRgb8(RgbImage::new(64, 48));
        let prompts = PromptSet {
            image: image.clone(),
            points: vec![
                Prompt::bbox(1.0, 1.0, 10.0, 10.0),
                Prompt::bbox(20.0, 20.0, 30.0, 30.0),
                Prompt::point(5.0, 5.0),
            ],
        };
        let report = tally.count(&image, None, "", Some(&prompts), "").unwrap();

        assert_eq!(report.exemplars, 2);
        assert_eq!(
            report.label,
            "Detected instances predicted with 2 visual exemplars."
        );
        let logits = report.logits.unwrap();
        assert_eq!(logits.len(), 2);
        assert_eq!(logits[0].len(), 2);
    }

    #[test]
    fn test_build_with_custom_registry() {
        let mut registry = ModelRegistry::new();
        registry.register("fixed", fixed_model);

        let mut config = small_config();
        config.model.modelname = "fixed".to_string();
        assert!(Tally::build_with(&registry, config, Device::Cpu, 1).is_ok());

        let err = Tally::build_with(&registry, small_config(), Device::Cpu, 1)
            .err()
            .unwrap();
        assert!(matches!(err, TallyError::Model(ModelError::UnknownModel { .. })));
    }

    #[test]
    fn test_heatmap_from_detections() {
        let mut tally = tally();
        let image = DynamicImage::ImageRgb8(RgbImage::new(64, 48));
        let detections = tally.detect(&image, "apple", None, "").unwrap();
        let png = tally.heatmap(&image, &detections).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }
}
