//! Ordering, truncation and threshold filtering of scored candidates.

use crate::vector::{RecordId, SearchResult};

/// Ranks raw `(id, score)` pairs into the final result list.
///
/// Drops NaN scores, keeps only hits with `score >= threshold`, orders by
/// descending score with ties broken by ascending id, and truncates to
/// `top_k`. `top_k == 0` yields nothing. Paths are resolved only for the
/// survivors, so at most `top_k` path strings are materialized.
pub fn rank_scored<F>(
    mut scored: Vec<(RecordId, f32)>,
    top_k: usize,
    threshold: f32,
    mut resolve_path: F,
) -> Vec<SearchResult>
where
    F: FnMut(RecordId) -> String,
{
    if top_k == 0 {
        return Vec::new();
    }

    scored.retain(|(_, score)| !score.is_nan() && *score >= threshold);
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scored.truncate(top_k);
    scored
        .into_iter()
        .map(|(id, score)| SearchResult::new(id, resolve_path(id), score))
        .collect()
}
