use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::{FeedType, ScoredResource};

/// Maximum recommendations kept per feed type
#[derive(Debug, Clone)]
pub struct RankingLimits {
    default_max: usize,
    per_feed: HashMap<FeedType, usize>,
}

impl RankingLimits {
    pub fn new(default_max: usize) -> Self {
        Self {
            default_max,
            per_feed: HashMap::new(),
        }
    }

    pub fn with_overrides(mut self, per_feed: HashMap<FeedType, usize>) -> Self {
        self.per_feed.extend(per_feed);
        self
    }

    pub fn max_for(&self, feed_type: FeedType) -> usize {
        self.per_feed
            .get(&feed_type)
            .copied()
            .unwrap_or(self.default_max)
    }
}

/// A candidate with its 0-based position in the final order
#[derive(Debug, Clone, PartialEq)]
pub struct RankedResource {
    pub position: u32,
    pub scored: ScoredResource,
}

/// Orders scored candidates deterministically and truncates them
///
/// Highest final score first. Ties go to the newer resource by `created_at`,
/// then to the lower resource id. NaN scores sort after every real score.
#[derive(Debug, Clone)]
pub struct Ranker {
    limits: RankingLimits,
}

impl Ranker {
    pub fn new(limits: RankingLimits) -> Self {
        Self { limits }
    }

    pub fn rank(
        &self,
        feed_type: FeedType,
        mut candidates: Vec<ScoredResource>,
    ) -> Vec<RankedResource> {
        candidates.sort_by(compare_candidates);
        candidates.truncate(self.limits.max_for(feed_type));

        candidates
            .into_iter()
            .enumerate()
            .map(|(index, scored)| RankedResource {
                position: index as u32,
                scored,
            })
            .collect()
    }
}

fn compare_candidates(a: &ScoredResource, b: &ScoredResource) -> Ordering {
    compare_scores_desc(a.final_score, b.final_score)
        .then_with(|| b.resource.created_at.cmp(&a.resource.created_at))
        .then_with(|| a.resource.id.cmp(&b.resource.id))
}

fn compare_scores_desc(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}
