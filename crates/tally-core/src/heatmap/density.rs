//! Gaussian density maps from instance centers.

use ndarray::{Array2, Axis};

use crate::math::gaussian_kernel;

/// Density map of `height × width` with a Gaussian blob per center.
///
/// Each normalized `(cx, cy)` becomes a unit impulse at
/// `(trunc(height * cy), trunc(width * cx))`, clamped into the grid, and the
/// grid is blurred with a separable Gaussian of the given sigma. Borders are
/// mirrored about the pixel edge (`d c b a | a b c d`). Sigma 0 leaves the
/// impulses as they are.
pub fn density_map(width: u32, height: u32, centers: &[[f32; 2]], sigma: f32) -> Array2<f32> {
    let (w, h) = (width as usize, height as usize);
    let mut map = Array2::<f32>::zeros((h, w));
    if w == 0 || h == 0 {
        return map;
    }

    for &[cx, cy] in centers {
        let row = cell(h, cy);
        let col = cell(w, cx);
        map[[row, col]] = 1.0;
    }

    if sigma <= 0.0 {
        return map;
    }

    let kernel = gaussian_kernel(sigma);
    let map = convolve_axis(&map, &kernel, Axis(0));
    convolve_axis(&map, &kernel, Axis(1))
}

/// Grid cell for a normalized coordinate along an axis of length `len`.
fn cell(len: usize, t: f32) -> usize {
    let index = (len as f32 * t) as i64;
    index.clamp(0, len as i64 - 1) as usize
}

/// Index into `0..len` after mirroring `i` about the grid edges.
fn reflect(i: i64, len: usize) -> usize {
    let len = len as i64;
    let period = 2 * len;
    let i = i.rem_euclid(period);
    (if i >= len { period - 1 - i } else { i }) as usize
}

fn convolve_axis(input: &Array2<f32>, kernel: &[f32], axis: Axis) -> Array2<f32> {
    let radius = (kernel.len() / 2) as i64;
    let mut output = Array2::<f32>::zeros(input.raw_dim());

    for (src, mut dst) in input.lanes(axis).into_iter().zip(output.lanes_mut(axis)) {
        let len = src.len();
        // Impulse maps are mostly zero; skip empty lanes.
        if src.iter().all(|&v| v == 0.0) {
            continue;
        }
        for (i, out) in dst.iter_mut().enumerate() {
            *out = kernel
                .iter()
                .enumerate()
                .map(|(k, &weight)| {
                    let j = reflect(i as i64 + k as i64 - radius, len);
                    weight * src[j]
                })
                .sum();
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argmax(map: &Array2<f32>) -> (usize, usize) {
        map.indexed_iter()
            .fold(((0, 0), f32::MIN), |best, (idx, &v)| {
                if v > best.1 {
                    (idx, v)
                } else {
                    best
                }
            })
            .0
    }

    #[test]
    fn test_center_peak() {
        let map = density_map(200, 200, &[[0.5, 0.5]], 1.0);
        assert_eq!(map.dim(), (200, 200));
        assert_eq!(argmax(&map), (100, 100));
    }

    #[test]
    fn test_mass_preserved_away_from_borders() {
        let map = density_map(100, 80, &[[0.5, 0.5]], 2.0);
        assert!((map.sum() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_reflect_boundary_keeps_mass() {
        // Blob at the corner folds back into the grid instead of leaking
        let map = density_map(50, 50, &[[0.0, 0.0]], 3.0);
        assert!((map.sum() - 1.0).abs() < 1e-4);
        assert_eq!(argmax(&map), (0, 0));
    }

    #[test]
    fn test_zero_sigma_is_impulse() {
        let map = density_map(10, 10, &[[0.25, 0.75]], 0.0);
        assert_eq!(map[[7, 2]], 1.0);
        assert_eq!(map.sum(), 1.0);
    }

    #[test]
    fn test_out_of_range_centers_clamped() {
        let map = density_map(10, 10, &[[1.0, 1.0], [-0.2, 0.5]], 0.0);
        assert_eq!(map[[9, 9]], 1.0);
        assert_eq!(map[[5, 0]], 1.0);
    }

    #[test]
    fn test_no_centers_is_zero() {
        let map = density_map(20, 10, &[], 1.0);
        assert!(map.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_reflect_index() {
        assert_eq!(reflect(-1, 5), 0);
        assert_eq!(reflect(-2, 5), 1);
        assert_eq!(reflect(5, 5), 4);
        assert_eq!(reflect(6, 5), 3);
        assert_eq!(reflect(3, 1), 0);
    }
}
