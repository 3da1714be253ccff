//! Image preprocessing for the counting detector.
//!
//! Every image goes through the same three steps:
//! - Random resize: the shorter side is scaled to one of the configured
//!   sizes, capped so the longer side stays within `max_size`
//! - Conversion to a float CHW tensor in `[0, 1]`
//! - Per-channel normalization with the configured mean/std
//!
//! Exemplar boxes are rescaled with the image so that they keep pointing at
//! the same pixels.

use image::imageops::FilterType;
use image::DynamicImage;
use ndarray::Array3;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::config::TransformConfig;
use crate::types::ExemplarBox;

/// Output `(height, width)` for an image of `(width, height)` whose shorter
/// side should become `size`, keeping the longer side within `max_size`.
pub fn target_size(width: u32, height: u32, size: u32, max_size: Option<u32>) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (height, width);
    }

    let (w, h) = (width as f64, height as f64);
    let mut size = size as f64;

    if let Some(max_size) = max_size {
        let min_original = w.min(h);
        let max_original = w.max(h);
        if max_original / min_original * size > max_size as f64 {
            size = (max_size as f64 * min_original / max_original).round_ties_even();
        }
    }

    if (w <= h && w == size) || (h <= w && h == size) {
        return (height, width);
    }

    if w < h {
        (((size * h) / w) as u32, size as u32)
    } else {
        (size as u32, ((size * w) / h) as u32)
    }
}

/// Seeded resize + normalize pipeline.
pub struct Transform {
    config: TransformConfig,
    rng: StdRng,
}

impl Transform {
    /// Build a transform whose size choices are reproducible for `seed`.
    pub fn from_config(config: &TransformConfig, seed: u64) -> Self {
        Self {
            config: config.clone(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Resize and normalize `image`, rescaling `boxes` to match.
    ///
    /// Returns a `[3, H, W]` tensor and the boxes in the resized frame.
    pub fn apply(
        &mut self,
        image: &DynamicImage,
        boxes: Option<&[ExemplarBox]>,
    ) -> (Array3<f32>, Vec<ExemplarBox>) {
        let size = self
            .config
            .sizes
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(800);

        let (width, height) = (image.width(), image.height());
        let (out_h, out_w) = target_size(width, height, size, self.config.max_size);

        let resized = if (out_w, out_h) == (width, height) {
            image.clone()
        } else {
            image.resize_exact(out_w, out_h, FilterType::Triangle)
        };

        tracing::trace!(
            "Resized {}x{} -> {}x{} (size {})",
            width,
            height,
            out_w,
            out_h,
            size
        );

        let scaled = match boxes {
            Some(boxes) if width > 0 && height > 0 => {
                let rw = out_w as f32 / width as f32;
                let rh = out_h as f32 / height as f32;
                boxes
                    .iter()
                    .map(|b| ExemplarBox {
                        x1: b.x1 * rw,
                        y1: b.y1 * rh,
                        x2: b.x2 * rw,
                        y2: b.y2 * rh,
                    })
                    .collect()
            }
            Some(boxes) => boxes.to_vec(),
            None => Vec::new(),
        };

        (self.normalize(&resized), scaled)
    }

    fn normalize(&self, image: &DynamicImage) -> Array3<f32> {
        let rgb = image.to_rgb8();
        let (w, h) = (rgb.width() as usize, rgb.height() as usize);
        let mean = self.config.mean;
        let std = self.config.std;

        Array3::from_shape_fn((3, h, w), |(c, y, x)| {
            let value = rgb.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
            (value - mean[c]) / std[c]
        })
    }
}
