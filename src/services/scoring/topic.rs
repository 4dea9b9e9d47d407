use crate::{
    error::AppResult,
    models::{RecommendationContext, Resource},
    services::scoring::Scorer,
};

/// Share of a resource's topics the user follows
pub struct TopicAffinityScorer {
    weight: f64,
}

impl TopicAffinityScorer {
    pub const KEY: &'static str = "topic_affinity";

    pub fn new(weight: f64) -> Self {
        Self { weight }
    }
}

#[async_trait::async_trait]
impl Scorer for TopicAffinityScorer {
    fn key(&self) -> &'static str {
        Self::KEY
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    async fn score(&self, resource: &Resource, context: &RecommendationContext) -> AppResult<f64> {
        if resource.topics.is_empty() {
            return Ok(0.0);
        }

        let matched = resource
            .topic_ids()
            .filter(|topic_id| context.signals.interest_topic_ids.contains(topic_id))
            .count();

        Ok(matched as f64 / resource.topics.len() as f64)
    }
}
