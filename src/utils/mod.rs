pub mod metrics;
pub mod validation;

use std::cmp::Ordering;

/// Counts processed chunks and hands control back to the tokio scheduler
/// every `every` chunks.
#[derive(Debug, Clone)]
pub struct YieldBudget {
    every: usize,
    processed: usize,
    yields: usize,
}

impl YieldBudget {
    pub fn new(every: usize) -> Self {
        Self {
            every: every.max(1),
            processed: 0,
            yields: 0,
        }
    }

    pub async fn tick(&mut self) {
        self.processed += 1;
        if self.processed % self.every == 0 {
            self.yields += 1;
            tokio::task::yield_now().await;
        }
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn yields(&self) -> usize {
        self.yields
    }
}

/// Descending score order. Ties compare equal so a stable sort keeps the
/// original position.
pub fn descending(a: f32, b: f32) -> Ordering {
    b.total_cmp(&a)
}

/// Indices of the `k` highest scores, highest first, ties in index order.
pub fn top_k_indices(scores: &[f32], k: usize) -> Vec<usize> {
    let mut indexed_scores: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();

    indexed_scores.sort_by(|a, b| descending(a.1, b.1));

    indexed_scores.into_iter().take(k).map(|(i, _)| i).collect()
}

pub fn mean_squared_error(errors: impl IntoIterator<Item = f32>) -> Option<f64> {
    let (sum, count) = errors
        .into_iter()
        .fold((0.0f64, 0usize), |(sum, count), error| (sum + (error as f64).powi(2), count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}
