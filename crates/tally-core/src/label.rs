//! Human-readable summary of what a counting run was prompted with.

/// Describe the prompt that produced a result.
///
/// Blank text with no exemplars means there was nothing to detect.
pub fn output_label(text: &str, num_exemplars: usize) -> String {
    let has_text = !text.trim().is_empty();
    let exemplars = match num_exemplars {
        0 => None,
        1 => Some("1 visual exemplar".to_string()),
        n => Some(format!("{n} visual exemplars")),
    };

    match (has_text, exemplars) {
        (true, Some(ex)) => format!("Detected instances predicted with text and {ex}."),
        (true, None) => "Detected instances predicted with text.".to_string(),
        (false, Some(ex)) => format!("Detected instances predicted with {ex}."),
        (false, None) => "Nothing specified to detect.".to_string(),
    }
}
