use std::sync::Arc;

use crate::{
    config::Config,
    services::{
        filters::{DownvotedResourceFilter, FilterChain, SeenResourceFilter},
        generator::{GeneratorSettings, RecommendationGenerator, Stores},
        ranker::Ranker,
        scoring::{
            CompositeScorer, EmbeddingSimilarityScorer, PopularityScorer, RecencyScorer, Scorer,
            TopicAffinityScorer,
        },
        signals::{PopularityProvider, SimilarityProvider},
    },
};

/// Default filter order: seen and recently recommended first, then downvoted
pub fn default_filters() -> FilterChain {
    FilterChain::default()
        .with(Arc::new(SeenResourceFilter))
        .with(Arc::new(DownvotedResourceFilter))
}

/// Every built-in scorer weighted from configuration
pub fn default_scorers(
    config: &Config,
    popularity: Arc<dyn PopularityProvider>,
    similarity: Arc<dyn SimilarityProvider>,
) -> Vec<Arc<dyn Scorer>> {
    vec![
        Arc::new(TopicAffinityScorer::new(config.topic_weight)),
        Arc::new(RecencyScorer::new(
            config.recency_weight,
            config.recency_half_life_days,
        )),
        Arc::new(PopularityScorer::new(
            popularity,
            config.popularity_weight,
            config.popularity_saturation,
        )),
        Arc::new(EmbeddingSimilarityScorer::new(
            similarity,
            config.similarity_weight,
        )),
    ]
}

pub fn build_generator(
    config: &Config,
    stores: Stores,
    scorers: Vec<Arc<dyn Scorer>>,
) -> RecommendationGenerator {
    let scorer = CompositeScorer::new(scorers, config.scoring_concurrency);
    tracing::info!(scorers = ?scorer.scorer_keys(), "Recommendation generator configured");

    RecommendationGenerator::new(
        stores,
        default_filters(),
        scorer,
        Ranker::new(config.ranking_limits()),
        GeneratorSettings {
            recent_lookback_days: config.recent_lookback_days,
            unit_concurrency: config.unit_concurrency,
        },
    )
}
