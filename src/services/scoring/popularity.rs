use std::sync::Arc;

use crate::{
    error::AppResult,
    models::{RecommendationContext, Resource},
    services::{scoring::Scorer, signals::PopularityProvider},
};

/// Community approval, saturating as `n / (n + saturation)` for net votes `n`
pub struct PopularityScorer {
    provider: Arc<dyn PopularityProvider>,
    weight: f64,
    saturation: f64,
}

impl PopularityScorer {
    pub const KEY: &'static str = "popularity";

    pub fn new(provider: Arc<dyn PopularityProvider>, weight: f64, saturation: f64) -> Self {
        Self {
            provider,
            weight,
            saturation: saturation.max(f64::MIN_POSITIVE),
        }
    }
}

#[async_trait::async_trait]
impl Scorer for PopularityScorer {
    fn key(&self) -> &'static str {
        Self::KEY
    }

    fn weight(&self) -> f64 {
        self.weight
    }

    async fn score(&self, resource: &Resource, _context: &RecommendationContext) -> AppResult<f64> {
        let net_votes = self.provider.net_votes(resource.id).await?;
        if net_votes <= 0 {
            return Ok(0.0);
        }

        let n = net_votes as f64;
        Ok(n / (n + self.saturation))
    }
}
