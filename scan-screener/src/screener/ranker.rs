//! Ranking.

use std::cmp::Ordering;

use super::scorer::ScoredCandidate;

/// Sort by total score descending and keep the first `top_n`.
///
/// The sort is stable, so tied candidates keep their fetch order.
pub fn rank(mut candidates: Vec<ScoredCandidate>, top_n: usize) -> Vec<ScoredCandidate> {
    candidates.sort_by(|a, b| {
        b.total_score
            .partial_cmp(&a.total_score)
            .unwrap_or(Ordering::Equal)
    });
    candidates.truncate(top_n);
    candidates
}
