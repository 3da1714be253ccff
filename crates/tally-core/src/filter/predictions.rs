//! Confidence filtering of raw detector output.

use ndarray::{Array2, Axis};

use crate::error::FilterError;
use crate::math::sigmoid;
use crate::model::ModelOutput;
use crate::types::Detections;

/// Minimum sigmoid confidence for a token to count as detected.
pub const CONFIDENCE_THRESHOLD: f32 = 0.23;

/// Keep the instances of the first image whose token confidences clear the
/// threshold.
///
/// Logits are restricted to the tokens selected by `keywords` and passed
/// through a sigmoid. With keywords given, an instance is kept only when every
/// selected token clears [`CONFIDENCE_THRESHOLD`] (so every instance is kept
/// when the keywords back no token); without keywords, any one token is enough.
pub fn boxes_from_prediction(
    output: &ModelOutput,
    text: &str,
    keywords: &str,
) -> Result<Detections, FilterError> {
    if output.pred_logits.shape()[0] == 0 || output.pred_boxes.shape()[0] == 0 {
        return Err(FilterError::EmptyOutput);
    }

    let logits = output.pred_logits.index_axis(Axis(0), 0);
    let boxes = output.pred_boxes.index_axis(Axis(0), 0);
    let word_ids = output.word_ids.first().map(Vec::as_slice).unwrap_or(&[]);

    let columns = logits.ncols();
    // Without a tokenization to go on, every logit column is a candidate.
    let indices = if word_ids.is_empty() && keywords.is_empty() {
        (0..columns).collect()
    } else {
        super::indices_to_filter(text, word_ids, keywords)?
    };
    if let Some(&index) = indices.iter().find(|&&i| i >= columns) {
        return Err(FilterError::TokenOutOfRange { index, columns });
    }

    let scores = logits.select(Axis(1), &indices).mapv(sigmoid);

    let require_all = !keywords.trim().is_empty();
    let keep: Vec<usize> = scores
        .axis_iter(Axis(0))
        .enumerate()
        .filter(|(_, row)| {
            if require_all {
                row.iter().all(|&s| s > CONFIDENCE_THRESHOLD)
            } else {
                row.iter().any(|&s| s > CONFIDENCE_THRESHOLD)
            }
        })
        .map(|(i, _)| i)
        .collect();

    tracing::debug!(
        "Kept {}/{} instances over {} tokens",
        keep.len(),
        scores.nrows(),
        indices.len()
    );

    let kept_boxes: Array2<f32> = boxes.select(Axis(0), &keep);
    let kept_logits: Array2<f32> = scores.select(Axis(0), &keep);

    Ok(Detections {
        boxes: kept_boxes,
        logits: kept_logits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    // Logit that maps to a sigmoid comfortably above / below the threshold.
    const HIGH: f32 = 2.0;
    const LOW: f32 = -3.0;

    fn output(logits: Vec<Vec<f32>>, word_ids: Vec<Option<usize>>) -> ModelOutput {
        let q = logits.len();
        let t = logits.first().map(Vec::len).unwrap_or(0);
        let flat: Vec<f32> = logits.into_iter().flatten().collect();
        let pred_logits = Array3::from_shape_vec((1, q, t), flat).unwrap();
        let pred_boxes = Array3::from_shape_fn((1, q, 4), |(_, i, j)| (i * 4 + j) as f32 / 100.0);
        ModelOutput {
            pred_logits,
            pred_boxes,
            word_ids: vec![word_ids],
        }
    }

    #[test]
    fn test_low_confidence_keeps_nothing() {
        let out = output(vec![vec![LOW; 3]; 4], vec![Some(0), Some(1), Some(2)]);
        for keywords in ["", "a", "a, red"] {
            let detections = boxes_from_prediction(&out, "a red car", keywords).unwrap();
            assert!(detections.is_empty(), "keywords {keywords:?}");
        }
    }

    #[test]
    fn test_any_token_suffices_without_keywords() {
        let out = output(
            vec![vec![LOW, HIGH, LOW], vec![LOW, LOW, LOW], vec![HIGH, LOW, LOW]],
            vec![Some(0), Some(1), Some(2)],
        );
        let detections = boxes_from_prediction(&out, "a red car", "").unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections.logits.ncols(), 3);
        // Rows 0 and 2 survive, in order
        assert!((detections.boxes[[0, 0]] - 0.0).abs() < 1e-6);
        assert!((detections.boxes[[1, 0]] - 0.08).abs() < 1e-6);
    }

    #[test]
    fn test_keywords_require_every_token() {
        let out = output(
            vec![
                vec![LOW, HIGH, HIGH],
                vec![LOW, HIGH, LOW],
                vec![HIGH, LOW, HIGH],
            ],
            vec![Some(0), Some(1), Some(2)],
        );
        let detections = boxes_from_prediction(&out, "a red car", "red, car").unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections.logits.shape(), &[1, 2]);
        assert!(detections.logits.iter().all(|&s| s > CONFIDENCE_THRESHOLD));
    }

    #[test]
    fn test_keyword_without_tokens_keeps_every_instance() {
        // "car" is word 2, but the tokenization only covers words 0 and 1
        let out = output(vec![vec![-5.0; 2]; 3], vec![Some(0), Some(1)]);
        let detections = boxes_from_prediction(&out, "a red car", "car").unwrap();
        assert_eq!(detections.len(), 3);
        assert_eq!(detections.logits.shape(), &[3, 0]);
    }

    #[test]
    fn test_threshold_is_strict() {
        // sigmoid(logit(0.23)) sits exactly on the threshold
        let at = (CONFIDENCE_THRESHOLD / (1.0 - CONFIDENCE_THRESHOLD)).ln();
        let out = output(vec![vec![at - 1e-4]], vec![Some(0)]);
        assert!(boxes_from_prediction(&out, "apple", "").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_keyword_propagates() {
        let out = output(vec![vec![HIGH; 3]], vec![Some(0), Some(1), Some(2)]);
        assert!(matches!(
            boxes_from_prediction(&out, "a red car", "bike"),
            Err(FilterError::InvalidKeyword { .. })
        ));
    }

    #[test]
    fn test_token_out_of_range() {
        // Tokenizer reports more tokens than the logits have columns
        let out = output(vec![vec![HIGH; 2]], vec![Some(0), Some(1), Some(2)]);
        assert_eq!(
            boxes_from_prediction(&out, "a red car", "car"),
            Err(FilterError::TokenOutOfRange {
                index: 2,
                columns: 2
            })
        );
    }

    #[test]
    fn test_empty_batch() {
        let out = ModelOutput {
            pred_logits: Array3::zeros((0, 0, 0)),
            pred_boxes: Array3::zeros((0, 0, 4)),
            word_ids: vec![],
        };
        assert_eq!(
            boxes_from_prediction(&out, "", ""),
            Err(FilterError::EmptyOutput)
        );
    }
}
