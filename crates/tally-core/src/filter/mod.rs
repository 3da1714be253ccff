//! Keyword and confidence filtering of model output.
//!
//! - **tokens**: map comma-separated keywords onto caption token indices
//! - **predictions**: sigmoid + threshold the raw logits, keeping boxes

pub mod predictions;
pub mod tokens;

pub use predictions::{boxes_from_prediction, CONFIDENCE_THRESHOLD};
pub use tokens::indices_to_filter;
