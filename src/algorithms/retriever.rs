use ndarray::{ArrayView1, ArrayView2};

use super::engine::NumericEngine;
use crate::models::Id;
use crate::utils::top_k_indices;

/// Scores every candidate row against `query` and returns the best `k`.
///
/// Scores come from one matrix-vector product. Equal scores keep row order.
/// Rows without a matching entry in `candidate_ids` are ignored.
pub fn score_and_rank(
    engine: &dyn NumericEngine,
    query: ArrayView1<'_, f32>,
    candidates: ArrayView2<'_, f32>,
    candidate_ids: &[Id],
    k: usize,
) -> Vec<(Id, f32)> {
    if k == 0 || candidates.nrows() == 0 {
        return Vec::new();
    }

    let scores: Vec<f32> = engine
        .mat_vec(candidates, query)
        .iter()
        .take(candidate_ids.len())
        .copied()
        .collect();

    top_k_indices(&scores, k)
        .into_iter()
        .map(|i| (candidate_ids[i].clone(), scores[i]))
        .collect()
}

pub fn rank_ids(
    engine: &dyn NumericEngine,
    query: ArrayView1<'_, f32>,
    candidates: ArrayView2<'_, f32>,
    candidate_ids: &[Id],
    k: usize,
) -> Vec<Id> {
    score_and_rank(engine, query, candidates, candidate_ids, k)
        .into_iter()
        .map(|(id, _)| id)
        .collect()
}
