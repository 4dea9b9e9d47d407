use std::sync::Arc;

use crate::{
    error::AppResult,
    models::{RecommendationContext, Resource},
    services::{scoring::Scorer, signals::SimilarityProvider},
};

/// Embedding similarity between the user's interests and the resource
///
/// Cosine similarity in `[-1, 1]` is mapped linearly onto `[0, 1]`. A provider
/// answering outside `[-1, 1]` yields an out-of-range score, which the
/// composite scorer discards.
pub struct EmbeddingSimilarityScorer {
    provider: Arc<dyn SimilarityProvider>,
    weight: f64,
}

impl EmbeddingSimilarityScorer {
    pub const KEY: &'static str = "embedding_similarity";

    pub fn new(provider: Arc<dyn SimilarityProvider>, weight: f64) -> Self {
        Self { provider, weight }
    }
}

#[async_trait::async_trait]
impl Scorer for EmbeddingSimilarityScorer {
    fn key(&self) -> &'static str {
        Self::KEY
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    async fn score(&self, resource: &Resource, context: &RecommendationContext) -> AppResult<f64> {
        let similarity = self
            .provider
            .similarity(context.user_id, resource.id)
            .await?;
        Ok((similarity + 1.0) / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FeedType;
    use crate::services::signals::MockSimilarityProvider;
    use crate::test_support::{context, resource};

    #[tokio::test]
    async fn test_maps_cosine_onto_unit_interval() {
        let ctx = context(FeedType::Paper);
        let user_id = ctx.user_id;

        let mut provider = MockSimilarityProvider::new();
        provider
            .expect_similarity()
            .withf(move |user, _| *user == user_id)
            .times(3)
            .returning({
                let mut answers = vec![1.0, 0.0, -1.0].into_iter();
                move |_, _| Ok(answers.next().unwrap_or(0.0))
            });

        let scorer = EmbeddingSimilarityScorer::new(Arc::new(provider), 1.0);
        let candidate = resource(FeedType::Paper);

        assert_eq!(scorer.score(&candidate, &ctx).await.unwrap(), 1.0);
        assert_eq!(scorer.score(&candidate, &ctx).await.unwrap(), 0.5);
        assert_eq!(scorer.score(&candidate, &ctx).await.unwrap(), 0.0);
    }
}
