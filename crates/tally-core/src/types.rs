//! Core data types for prompts, detections and reports.

use image::DynamicImage;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Flag pair that marks a prompt as a box annotation.
pub const BOX_FLAGS: (f32, f32) = (2.0, 3.0);

/// A point or box annotation drawn by the user.
///
/// Layout is `(x1, y1, flag1, x2, y2, flag2)`. Flags `(2.0, 3.0)` mean the
/// two coordinate pairs are opposite corners of a box; anything else is a
/// point click. Deserializes from a plain JSON array of six numbers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prompt(pub [f32; 6]);

impl Prompt {
    /// Build a box prompt from two opposite corners.
    pub fn bbox(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self([x1, y1, BOX_FLAGS.0, x2, y2, BOX_FLAGS.1])
    }

    /// Build a point prompt.
    pub fn point(x: f32, y: f32) -> Self {
        Self([x, y, 1.0, 0.0, 0.0, 4.0])
    }

    /// Whether the flags mark this prompt as a box.
    pub fn is_box(&self) -> bool {
        self.0[2] == BOX_FLAGS.0 && self.0[5] == BOX_FLAGS.1
    }
}

/// An exemplar rectangle `(x1, y1, x2, y2)` in image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExemplarBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl ExemplarBox {
    pub fn to_array(self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// The exemplar-bearing image together with the prompts drawn on it.
#[derive(Debug, Clone)]
pub struct PromptSet {
    pub image: DynamicImage,
    pub points: Vec<Prompt>,
}

/// A single kept instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Normalized `(cx, cy, w, h)`
    pub bbox: [f32; 4],

    /// Highest per-token confidence of this instance
    pub score: f32,
}

/// Filtered model output.
///
/// `boxes` is `k × 4` normalized `(cx, cy, w, h)`; `logits` is `k × m`
/// sigmoid confidences for the `m` allowed tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct Detections {
    pub boxes: Array2<f32>,
    pub logits: Array2<f32>,
}

impl Detections {
    pub fn len(&self) -> usize {
        self.boxes.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.nrows() == 0
    }

    /// Normalized `(cx, cy)` of every kept box.
    pub fn centers(&self) -> Vec<[f32; 2]> {
        self.boxes
            .axis_iter(Axis(0))
            .map(|row| [row[0], row[1]])
            .collect()
    }

    /// Kept instances with their best token score.
    pub fn to_vec(&self) -> Vec<Detection> {
        self.boxes
            .axis_iter(Axis(0))
            .zip(self.logits.axis_iter(Axis(0)))
            .map(|(bbox, scores)| Detection {
                bbox: [bbox[0], bbox[1], bbox[2], bbox[3]],
                score: scores.iter().copied().fold(0.0, f32::max),
            })
            .collect()
    }
}

/// Result of one counting run, as written to JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountReport {
    /// Source image, when it came from disk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,

    /// Free-text prompt
    pub text: String,

    /// Number of visual exemplars supplied
    pub exemplars: usize,

    /// Human-readable summary of what was prompted
    pub label: String,

    /// Number of detected instances
    pub count: usize,

    /// Kept instances
    pub detections: Vec<Detection>,

    /// Per-token confidences of kept instances
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logits: Option<Vec<Vec<f32>>>,

    /// Free-form note attached by the caller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}
