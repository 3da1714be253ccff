//! Single-image inference: preprocess, forward, filter.

use image::DynamicImage;
use ndarray::{Array2, Array3, Axis};

use crate::error::Result;
use crate::filter::boxes_from_prediction;
use crate::model::{CountingModel, Device, ModelInput};
use crate::prompt::box_inputs;
use crate::transform::Transform;
use crate::types::{Detections, PromptSet};

/// Transformed tensors for one image and its exemplars.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// `[3, H, W]`
    pub image: Array3<f32>,
    /// `[3, H', W']`
    pub exemplar_image: Array3<f32>,
    /// `N × 4` exemplar boxes in the exemplar image's transformed frame
    pub exemplars: Array2<f32>,
}

/// Transform the query image and the exemplar-bearing image.
///
/// The two images go through the transform separately; only the exemplar
/// image carries boxes. Without a prompt set the query image doubles as the
/// exemplar image and there are no exemplars.
pub fn preprocess(
    transform: &mut Transform,
    image: &DynamicImage,
    prompts: Option<&PromptSet>,
) -> Preprocessed {
    let (image_tensor, _) = transform.apply(image, None);

    let (exemplar_image, boxes) = match prompts {
        Some(prompts) => {
            let boxes = box_inputs(&prompts.points);
            transform.apply(&prompts.image, Some(&boxes))
        }
        None => (image_tensor.clone(), Vec::new()),
    };

    let mut exemplars = Array2::<f32>::zeros((boxes.len(), 4));
    for (mut row, b) in exemplars.axis_iter_mut(Axis(0)).zip(&boxes) {
        row.assign(&ndarray::aview1(&b.to_array()));
    }

    Preprocessed {
        image: image_tensor,
        exemplar_image,
        exemplars,
    }
}

/// Count the instances of `text` and/or the prompted exemplars in `image`.
///
/// `keywords` is accepted for interface compatibility but not applied: the
/// filter always runs over every caption token.
pub fn predict(
    model: &dyn CountingModel,
    transform: &mut Transform,
    image: &DynamicImage,
    text: &str,
    prompts: Option<&PromptSet>,
    device: Device,
    keywords: &str,
) -> Result<Detections> {
    if !keywords.is_empty() {
        tracing::debug!("Ignoring keywords {:?} during prediction", keywords);
    }

    let inputs = preprocess(transform, image, prompts);
    tracing::debug!(
        "Running forward pass on {} (image {:?}, {} exemplars)",
        device,
        inputs.image.shape(),
        inputs.exemplars.nrows()
    );

    let input = ModelInput {
        images: inputs.image.insert_axis(Axis(0)),
        exemplar_images: inputs.exemplar_image.insert_axis(Axis(0)),
        exemplars: vec![inputs.exemplars],
        labels: vec![vec![0]],
        captions: vec![format!("{text} .")],
    };

    let output = model.forward(&input)?;
    let detections = boxes_from_prediction(&output, text, "")?;

    tracing::info!("Detected {} instances", detections.len());
    Ok(detections)
}
