use crate::{
    error::{AppError, AppResult},
    models::{RecommendationContext, Resource},
    services::scoring::Scorer,
};

/// Exponential freshness decay relative to the run's target date
///
/// `0.5^(age_days / half_life_days)`; resources dated on or after the target
/// date score 1.
pub struct RecencyScorer {
    weight: f64,
    half_life_days: f64,
}

impl RecencyScorer {
    pub const KEY: &'static str = "recency";

    pub fn new(weight: f64, half_life_days: f64) -> Self {
        Self {
            weight,
            half_life_days,
        }
    }
}

#[async_trait::async_trait]
impl Scorer for RecencyScorer {
    fn key(&self) -> &'static str {
        Self::KEY
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    async fn score(&self, resource: &Resource, context: &RecommendationContext) -> AppResult<f64> {
        if !(self.half_life_days.is_finite() && self.half_life_days > 0.0) {
            return Err(AppError::Scoring(format!(
                "Recency half-life must be positive, got {}",
                self.half_life_days
            )));
        }

        let age_days = (context.date - resource.reference_date()).num_days();
        if age_days <= 0 {
            return Ok(1.0);
        }

        Ok(0.5f64.powf(age_days as f64 / self.half_life_days))
    }
}
