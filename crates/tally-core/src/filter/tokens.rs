//! Keyword to token-index mapping.

use crate::error::FilterError;

/// Token indices backing the given keywords.
///
/// `word_ids` has one entry per caption token naming the whitespace word it
/// came from (`None` for special tokens). An empty `keywords` string selects
/// every token. Otherwise each comma-separated keyword is looked up among the
/// words of `text`, scanning from the previous match onward so that repeated
/// words resolve left to right. A keyword that is missing, or only occurs
/// before the previous match, is an error.
pub fn indices_to_filter(
    text: &str,
    word_ids: &[Option<usize>],
    keywords: &str,
) -> Result<Vec<usize>, FilterError> {
    if keywords.is_empty() {
        return Ok((0..word_ids.len()).collect());
    }

    let input_words: Vec<&str> = text.split_whitespace().collect();
    let mut word_inds: Vec<usize> = Vec::new();

    for keyword in keywords.split(',').map(str::trim) {
        let start = word_inds.last().copied().unwrap_or(0);
        let ind = input_words
            .iter()
            .skip(start)
            .position(|word| *word == keyword)
            .map(|offset| start + offset)
            .ok_or_else(|| FilterError::InvalidKeyword {
                keyword: keyword.to_string(),
            })?;
        word_inds.push(ind);
    }

    tracing::trace!("Keywords {:?} matched words {:?}", keywords, word_inds);

    Ok(word_ids
        .iter()
        .enumerate()
        .filter(|(_, word)| word.is_some_and(|w| word_inds.contains(&w)))
        .map(|(ind, _)| ind)
        .collect())
}
