//! Bounded edit distance for `term~N` query expansion.

use crate::index::{InvertedIndex, TermEntry};

/// Upper bound accepted for `~N`; larger requests are clamped.
pub const MAX_EDIT_DISTANCE: u8 = 3;

/// Levenshtein distance between `a` and `b` if it is at most `max`.
///
/// The length difference is a lower bound on the distance, and a DP row whose minimum
/// already exceeds `max` can only grow, so both cases bail out early.
pub fn bounded_distance(a: &str, b: &str, max: usize) -> Option<usize> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > max {
        return None;
    }

    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ac) in a.iter().enumerate() {
        let mut prev = row[0];
        row[0] = i + 1;
        let mut row_min = row[0];
        for (j, bc) in b.iter().enumerate() {
            let above = row[j + 1];
            let cost = usize::from(ac != bc);
            row[j + 1] = (above + 1).min(row[j] + 1).min(prev + cost);
            prev = above;
            row_min = row_min.min(row[j + 1]);
        }
        if row_min > max {
            return None;
        }
    }
    let dist = row[b.len()];
    (dist <= max).then_some(dist)
}

/// Vocabulary terms within `max` edits of `term`, in vocabulary order.
pub fn expand<'a>(index: &'a InvertedIndex, term: &str, max: u8) -> Vec<(&'a str, &'a TermEntry)> {
    let max = usize::from(max.min(MAX_EDIT_DISTANCE));
    index
        .vocabulary()
        .filter(|(candidate, _)| bounded_distance(term, candidate, max).is_some())
        .collect()
}
