//! Reciprocal Rank Fusion.
//!
//! RRF(d) = sum over lists of 1 / (k + rank(d)), with ranks starting at 1.

use std::collections::HashMap;
use tracing::debug;

use crate::store::{Payload, ScoredPoint};

/// Standard RRF constant.
pub const DEFAULT_RRF_K: f64 = 60.0;

/// A point after fusion, carrying its summed reciprocal-rank score.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedPoint {
    pub id: u64,
    pub score: f64,
    pub payload: Payload,
}

/// Contribution of one list position to a candidate's fused score.
pub fn reciprocal_rank(k: f64, rank: usize) -> f64 {
    1.0 / (k + rank as f64)
}

/// Fuse ranked lists into the top `limit` points by summed reciprocal rank.
///
/// Each list must be ordered best first. A point appearing in several lists
/// keeps the payload from the first list it was seen in. Ties are broken by
/// ascending id.
pub fn rrf_fuse(lists: &[Vec<ScoredPoint>], k: f64, limit: usize) -> Vec<FusedPoint> {
    let mut scores: HashMap<u64, FusedPoint> = HashMap::new();

    for list in lists {
        for (index, point) in list.iter().enumerate() {
            let contribution = reciprocal_rank(k, index + 1);
            scores
                .entry(point.id)
                .and_modify(|fused| fused.score += contribution)
                .or_insert_with(|| FusedPoint {
                    id: point.id,
                    score: contribution,
                    payload: point.payload.clone(),
                });
        }
    }

    let mut fused: Vec<FusedPoint> = scores.into_values().collect();
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.id.cmp(&b.id))
    });
    fused.truncate(limit);

    debug!(
        lists = lists.len(),
        candidates = lists.iter().map(Vec::len).sum::<usize>(),
        fused = fused.len(),
        "RRF fusion complete"
    );
    fused
}
