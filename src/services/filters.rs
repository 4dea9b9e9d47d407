use std::sync::Arc;

use crate::{
    error::AppResult,
    models::{RecommendationContext, ScoredResource, Vote},
};

/// Removes candidates a user should not be shown
///
/// Implementations must keep the relative order of the candidates they keep.
#[async_trait::async_trait]
pub trait Filter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn filter(
        &self,
        candidates: Vec<ScoredResource>,
        context: &RecommendationContext,
    ) -> AppResult<Vec<ScoredResource>>;
}

/// Applies filters in registration order, each receiving the previous output
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChain {
    pub fn new(filters: Vec<Arc<dyn Filter>>) -> Self {
        Self { filters }
    }

    pub fn with(mut self, filter: Arc<dyn Filter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub async fn apply(
        &self,
        mut candidates: Vec<ScoredResource>,
        context: &RecommendationContext,
    ) -> AppResult<Vec<ScoredResource>> {
        for filter in &self.filters {
            let before = candidates.len();
            candidates = filter.filter(candidates, context).await?;
            tracing::debug!(
                filter = filter.name(),
                user_id = %context.user_id,
                removed = before.saturating_sub(candidates.len()),
                remaining = candidates.len(),
                "Filter applied"
            );
        }
        Ok(candidates)
    }
}

/// Drops resources the user has viewed or was recommended in the lookback window
pub struct SeenResourceFilter;

#[async_trait::async_trait]
impl Filter for SeenResourceFilter {
    fn name(&self) -> &'static str {
        "seen_resources"
    }

    async fn filter(
        &self,
        candidates: Vec<ScoredResource>,
        context: &RecommendationContext,
    ) -> AppResult<Vec<ScoredResource>> {
        Ok(candidates
            .into_iter()
            .filter(|candidate| !context.is_excluded(&candidate.resource_id()))
            .collect())
    }
}

/// Drops resources the user voted down
pub struct DownvotedResourceFilter;

#[async_trait::async_trait]
impl Filter for DownvotedResourceFilter {
    fn name(&self) -> &'static str {
        "downvoted_resources"
    }

    async fn filter(
        &self,
        candidates: Vec<ScoredResource>,
        context: &RecommendationContext,
    ) -> AppResult<Vec<ScoredResource>> {
        Ok(candidates
            .into_iter()
            .filter(|candidate| context.vote_for(&candidate.resource_id()) != Some(Vote::Down))
            .collect())
    }
}
