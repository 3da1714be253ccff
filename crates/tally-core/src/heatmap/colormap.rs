//! The "jet" colormap.

/// Piecewise-linear control points `(position, value)` per channel.
const RED: &[(f32, f32)] = &[(0.0, 0.0), (0.35, 0.0), (0.66, 1.0), (0.89, 1.0), (1.0, 0.5)];
const GREEN: &[(f32, f32)] = &[
    (0.0, 0.0),
    (0.125, 0.0),
    (0.375, 1.0),
    (0.64, 1.0),
    (0.91, 0.0),
    (1.0, 0.0),
];
const BLUE: &[(f32, f32)] = &[(0.0, 0.5), (0.11, 1.0), (0.34, 1.0), (0.65, 0.0), (1.0, 0.0)];

fn interpolate(points: &[(f32, f32)], t: f32) -> f32 {
    for pair in points.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        if t <= x1 {
            return y0 + (y1 - y0) * (t - x0) / (x1 - x0);
        }
    }
    points.last().map(|&(_, y)| y).unwrap_or(0.0)
}

/// Map `t` in `[0, 1]` to an RGB color in `[0, 1]`; out-of-range input is clamped.
pub fn jet(t: f32) -> [f32; 3] {
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    [
        interpolate(RED, t),
        interpolate(GREEN, t),
        interpolate(BLUE, t),
    ]
}
