//! Density heatmaps over counted images.
//!
//! Each kept box center contributes a Gaussian blob; the summed density is
//! normalized, colored with the jet colormap and alpha-blended over the
//! source image. Output is PNG bytes held only in memory.

mod colormap;
mod density;

pub use colormap::jet;
pub use density::density_map;

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use ndarray::Array2;

use crate::config::RenderConfig;
use crate::error::RenderError;

/// Renders density overlays.
pub struct HeatmapRenderer {
    config: RenderConfig,
}

impl HeatmapRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    /// Blur sigma for an image of the given width (integer division).
    pub fn sigma_for(&self, width: u32) -> u32 {
        width / self.config.sigma_divisor.max(1)
    }

    /// Overlay the density of `centers` on `image`.
    pub fn render(&self, image: &DynamicImage, centers: &[[f32; 2]]) -> RgbImage {
        let base = image.to_rgb8();
        let (width, height) = base.dimensions();
        let sigma = self.sigma_for(width) as f32;
        let density = normalize(density_map(width, height, centers, sigma));

        let alpha = self.config.alpha;
        RgbImage::from_fn(width, height, |x, y| {
            let color = jet(density[[y as usize, x as usize]]);
            let under = base.get_pixel(x, y);
            Rgb(std::array::from_fn(|c| {
                let blended = alpha * color[c] * 255.0 + (1.0 - alpha) * under[c] as f32;
                blended.round().clamp(0.0, 255.0) as u8
            }))
        })
    }

    /// Render the overlay and encode it as PNG.
    pub fn generate_heatmap(
        &self,
        image: &DynamicImage,
        centers: &[[f32; 2]],
    ) -> Result<Vec<u8>, RenderError> {
        let overlay = self.render(image, centers);

        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(overlay).write_to(&mut buffer, ImageFormat::Png)?;

        tracing::debug!(
            "Rendered heatmap for {} centers ({} bytes)",
            centers.len(),
            buffer.get_ref().len()
        );
        Ok(buffer.into_inner())
    }
}

impl Default for HeatmapRenderer {
    fn default() -> Self {
        Self::new(RenderConfig::default())
    }
}

/// PNG heatmap with the default alpha and blur.
pub fn generate_heatmap(image: &DynamicImage, centers: &[[f32; 2]]) -> Result<Vec<u8>, RenderError> {
    HeatmapRenderer::default().generate_heatmap(image, centers)
}

/// Rescale to `[0, 1]` by the map's own min/max; a flat map becomes all zeros.
fn normalize(map: Array2<f32>) -> Array2<f32> {
    let min = map.iter().copied().fold(f32::INFINITY, f32::min);
    let max = map.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if range.is_nan() || range <= 0.0 {
        return Array2::zeros(map.raw_dim());
    }
    map.mapv(|v| (v - min) / range)
}
