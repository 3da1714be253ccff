//! Prompt encoding: user annotations to exemplar boxes.

use crate::types::{ExemplarBox, Prompt};

/// Keep the box-flagged prompts as exemplar boxes, in input order.
///
/// Point prompts are dropped; coordinates pass through untouched.
pub fn box_inputs(prompts: &[Prompt]) -> Vec<ExemplarBox> {
    prompts
        .iter()
        .filter(|p| p.is_box())
        .map(|p| ExemplarBox {
            x1: p.0[0],
            y1: p.0[1],
            x2: p.0[3],
            y2: p.0[4],
        })
        .collect()
}
