use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::algorithms::CollaborativeFiltering;
use crate::models::{Id, Interaction};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecommendationMetrics {
    pub precision_at_k: f64,
    pub recall_at_k: f64,
    pub f1_score: f64,
    pub ndcg_at_k: f64,
    pub map_score: f64,
    pub coverage: f64,
    pub mse: Option<f64>,
    pub users_evaluated: usize,
}

#[derive(Debug, Clone)]
pub struct MetricsCalculator {
    k: usize,
}

impl MetricsCalculator {
    pub fn new(k: usize) -> Self {
        Self { k }
    }

    pub fn calculate_precision_at_k(&self, recommended: &[Id], relevant: &[Id]) -> f64 {
        if recommended.is_empty() || self.k == 0 {
            return 0.0;
        }

        let relevant_set: HashSet<_> = relevant.iter().collect();
        let relevant_recommended = recommended
            .iter()
            .take(self.k)
            .filter(|item| relevant_set.contains(item))
            .count();

        relevant_recommended as f64 / self.k.min(recommended.len()) as f64
    }

    pub fn calculate_recall_at_k(&self, recommended: &[Id], relevant: &[Id]) -> f64 {
        if relevant.is_empty() {
            return 0.0;
        }

        let relevant_set: HashSet<_> = relevant.iter().collect();
        let relevant_recommended = recommended
            .iter()
            .take(self.k)
            .filter(|item| relevant_set.contains(item))
            .count();

        relevant_recommended as f64 / relevant.len() as f64
    }

    pub fn calculate_f1_score(&self, precision: f64, recall: f64) -> f64 {
        if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        }
    }

    pub fn calculate_ndcg_at_k(&self, recommended: &[Id], relevant_scores: &HashMap<Id, f64>) -> f64 {
        let dcg = self.calculate_dcg(recommended, relevant_scores);
        let idcg = self.calculate_ideal_dcg(relevant_scores);

        if idcg == 0.0 {
            0.0
        } else {
            dcg / idcg
        }
    }

    fn calculate_dcg(&self, recommended: &[Id], relevant_scores: &HashMap<Id, f64>) -> f64 {
        recommended
            .iter()
            .take(self.k)
            .enumerate()
            .map(|(i, item_id)| {
                let relevance = relevant_scores.get(item_id).copied().unwrap_or(0.0);
                relevance / ((i + 2) as f64).log2()
            })
            .sum()
    }

    fn calculate_ideal_dcg(&self, relevant_scores: &HashMap<Id, f64>) -> f64 {
        let mut scores: Vec<f64> = relevant_scores.values().copied().collect();
        scores.sort_by(|a, b| b.total_cmp(a));

        scores
            .iter()
            .take(self.k)
            .enumerate()
            .map(|(i, &score)| score / ((i + 2) as f64).log2())
            .sum()
    }

    pub fn calculate_average_precision(&self, recommended: &[Id], relevant: &[Id]) -> f64 {
        if relevant.is_empty() {
            return 0.0;
        }

        let relevant_set: HashSet<_> = relevant.iter().collect();
        let mut relevant_found = 0;
        let mut precision_sum = 0.0;

        for (i, item) in recommended.iter().take(self.k).enumerate() {
            if relevant_set.contains(item) {
                relevant_found += 1;
                precision_sum += relevant_found as f64 / (i + 1) as f64;
            }
        }

        precision_sum / relevant.len().min(self.k.max(1)) as f64
    }

    pub fn calculate_coverage(&self, recommended_items: &[Id], all_items: &[Id]) -> f64 {
        if all_items.is_empty() {
            return 0.0;
        }

        let recommended_set: HashSet<_> = recommended_items.iter().collect();
        let covered_items = all_items
            .iter()
            .filter(|item| recommended_set.contains(item))
            .count();

        covered_items as f64 / all_items.len() as f64
    }

    /// Ranks entities for every user in `holdout` and averages the ranking
    /// metrics against that user's held-out entities. Ratings act as graded
    /// relevance for NDCG.
    pub async fn evaluate_model(
        &self,
        model: &CollaborativeFiltering,
        holdout: &[Interaction],
    ) -> RecommendationMetrics {
        let mut per_user: BTreeMap<&Id, Vec<&Interaction>> = BTreeMap::new();
        for interaction in holdout {
            per_user.entry(&interaction.user).or_default().push(interaction);
        }

        let mut metrics = RecommendationMetrics {
            mse: model.evaluate(holdout).await,
            ..RecommendationMetrics::default()
        };
        let mut recommended_union = Vec::new();

        for (user, interactions) in &per_user {
            let recommended = model.get_entities(user, self.k).await;
            if recommended.is_empty() {
                continue;
            }
            let relevant: Vec<Id> = interactions.iter().map(|i| i.entity.clone()).collect();
            let scores: HashMap<Id, f64> = interactions
                .iter()
                .map(|i| (i.entity.clone(), i.target() as f64))
                .collect();

            let precision = self.calculate_precision_at_k(&recommended, &relevant);
            let recall = self.calculate_recall_at_k(&recommended, &relevant);
            metrics.precision_at_k += precision;
            metrics.recall_at_k += recall;
            metrics.ndcg_at_k += self.calculate_ndcg_at_k(&recommended, &scores);
            metrics.map_score += self.calculate_average_precision(&recommended, &relevant);
            metrics.users_evaluated += 1;
            recommended_union.extend(recommended);
        }

        if metrics.users_evaluated > 0 {
            let n = metrics.users_evaluated as f64;
            metrics.precision_at_k /= n;
            metrics.recall_at_k /= n;
            metrics.ndcg_at_k /= n;
            metrics.map_score /= n;
            metrics.f1_score = self.calculate_f1_score(metrics.precision_at_k, metrics.recall_at_k);
        }
        let all_entities = model.index().all_entities().await;
        metrics.coverage = self.calculate_coverage(&recommended_union, &all_entities);
        metrics
    }
}
