use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt::Display};
use uuid::Uuid;

use super::{FeedType, Resource};

/// Identifies one persisted recommendation set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecommendationKey {
    pub user_id: Uuid,
    pub feed_type: FeedType,
    pub date: NaiveDate,
}

impl RecommendationKey {
    pub fn new(user_id: Uuid, feed_type: FeedType, date: NaiveDate) -> Self {
        Self {
            user_id,
            feed_type,
            date,
        }
    }
}

impl Display for RecommendationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.user_id, self.feed_type, self.date)
    }
}

/// A candidate paired with its per-signal and aggregate scores
///
/// Lives only for the duration of a generation run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredResource {
    pub resource: Resource,
    /// Scorer key → score, for explainability
    pub scores: BTreeMap<String, f64>,
    pub final_score: f64,
}

impl ScoredResource {
    /// Wraps a candidate that has not been scored yet
    pub fn unscored(resource: Resource) -> Self {
        Self {
            resource,
            scores: BTreeMap::new(),
            final_score: 0.0,
        }
    }

    pub fn resource_id(&self) -> Uuid {
        self.resource.id
    }
}

/// A persisted, ranked recommendation row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub feed_type: FeedType,
    pub date: NaiveDate,
    pub resource_id: Uuid,
    pub resource: Resource,
    /// 0-based rank within the set
    pub position: u32,
    pub score: f64,
    pub generated_at: DateTime<Utc>,
}

impl Recommendation {
    pub fn new(
        key: &RecommendationKey,
        scored: ScoredResource,
        position: u32,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: key.user_id,
            feed_type: key.feed_type,
            date: key.date,
            resource_id: scored.resource.id,
            resource: scored.resource,
            position,
            score: scored.final_score,
            generated_at,
        }
    }

    pub fn key(&self) -> RecommendationKey {
        RecommendationKey::new(self.user_id, self.feed_type, self.date)
    }
}

/// One recommendation as returned to the API layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationItem {
    pub id: Uuid,
    pub resource: Resource,
    pub position: u32,
    pub score: f64,
    pub generated_at: DateTime<Utc>,
}

impl From<Recommendation> for RecommendationItem {
    fn from(recommendation: Recommendation) -> Self {
        Self {
            id: recommendation.id,
            resource: recommendation.resource,
            position: recommendation.position,
            score: recommendation.score,
            generated_at: recommendation.generated_at,
        }
    }
}

/// A feed's recommendations for the date actually served
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedRecommendations {
    pub feed_type: FeedType,
    /// Effective date, which differs from `requested_date` on fallback
    pub date: NaiveDate,
    pub requested_date: NaiveDate,
    pub is_fallback: bool,
    pub recommendations: Vec<RecommendationItem>,
}

impl FeedRecommendations {
    pub fn new(
        feed_type: FeedType,
        requested_date: NaiveDate,
        date: NaiveDate,
        mut rows: Vec<Recommendation>,
    ) -> Self {
        rows.sort_by_key(|row| row.position);
        Self {
            feed_type,
            date,
            requested_date,
            is_fallback: date != requested_date,
            recommendations: rows.into_iter().map(RecommendationItem::from).collect(),
        }
    }

    /// Shape returned when no date holds data for the feed
    pub fn empty(feed_type: FeedType, requested_date: NaiveDate) -> Self {
        Self::new(feed_type, requested_date, requested_date, Vec::new())
    }
}
