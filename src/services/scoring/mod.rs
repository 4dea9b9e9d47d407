//! Relevance scoring
//!
//! Each `Scorer` computes one signal in `[0, 1]`. `CompositeScorer` runs every
//! registered scorer for a candidate and combines them as a weighted mean:
//!
//! `final = Σ(score_i · weight_i) / Σ(weight_i)` over scorers with weight > 0
//!
//! A scorer that errors or answers outside `[0, 1]` is dropped from both sums
//! for that candidate only. With no usable weight the final score is 0.

use futures::{future::join_all, stream, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{
    error::AppResult,
    models::{RecommendationContext, Resource, ScoredResource},
};

pub mod popularity;
pub mod recency;
pub mod similarity;
pub mod topic;

pub use popularity::PopularityScorer;
pub use recency::RecencyScorer;
pub use similarity::EmbeddingSimilarityScorer;
pub use topic::TopicAffinityScorer;

/// One relevance signal
#[async_trait::async_trait]
pub trait Scorer: Send + Sync {
    /// Stable identifier recorded in the per-signal score map
    fn key(&self) -> &'static str;

    /// Non-negative contribution weight
    fn weight(&self) -> f64;

    /// Score in `[0, 1]`
    async fn score(&self, resource: &Resource, context: &RecommendationContext)
        -> AppResult<f64>;
}

pub struct CompositeScorer {
    scorers: Vec<Arc<dyn Scorer>>,
    max_concurrency: usize,
}

impl CompositeScorer {
    pub fn new(scorers: Vec<Arc<dyn Scorer>>, max_concurrency: usize) -> Self {
        Self {
            scorers,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn scorer_keys(&self) -> Vec<&'static str> {
        self.scorers.iter().map(|scorer| scorer.key()).collect()
    }

    /// Scores one candidate against every registered scorer
    pub async fn score(
        &self,
        resource: Resource,
        context: &RecommendationContext,
    ) -> ScoredResource {
        let candidate = &resource;
        let results = join_all(self.scorers.iter().map(|scorer| async move {
            (scorer, scorer.score(candidate, context).await)
        }))
        .await;

        let mut scores = BTreeMap::new();
        let mut weighted_sum = 0.0;
        let mut weight_sum = 0.0;

        for (scorer, result) in results {
            let score = match result {
                Ok(score) if score.is_finite() && (0.0..=1.0).contains(&score) => score,
                Ok(score) => {
                    tracing::warn!(
                        scorer = scorer.key(),
                        resource_id = %candidate.id,
                        score,
                        "Scorer returned out-of-range value, excluding from aggregate"
                    );
                    continue;
                }
                Err(e) => {
                    tracing::warn!(
                        scorer = scorer.key(),
                        resource_id = %candidate.id,
                        error = %e,
                        "Scorer failed, excluding from aggregate"
                    );
                    continue;
                }
            };

            scores.insert(scorer.key().to_string(), score);

            let weight = effective_weight(scorer.weight());
            if weight > 0.0 {
                weighted_sum += score * weight;
                weight_sum += weight;
            }
        }

        let final_score = if weight_sum > 0.0 {
            (weighted_sum / weight_sum).clamp(0.0, 1.0)
        } else {
            0.0
        };

        ScoredResource {
            resource,
            scores,
            final_score,
        }
    }

    /// Scores candidates with at most `max_concurrency` in flight, preserving order
    pub async fn score_all(
        &self,
        candidates: Vec<ScoredResource>,
        context: &RecommendationContext,
    ) -> Vec<ScoredResource> {
        stream::iter(candidates)
            .map(|candidate| self.score(candidate.resource, context))
            .buffered(self.max_concurrency)
            .collect()
            .await
    }
}

/// Negative and non-finite weights contribute nothing
fn effective_weight(weight: f64) -> f64 {
    if weight.is_finite() && weight > 0.0 {
        weight
    } else {
        0.0
    }
}
