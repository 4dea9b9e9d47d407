use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::{FeedType, Vote};

/// Interest signals scorers and filters may consult
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserSignals {
    pub interest_topic_ids: HashSet<Uuid>,
    pub votes: HashMap<Uuid, Vote>,
}

/// Per-run view of a user, built fresh for each generation unit
#[derive(Debug, Clone)]
pub struct RecommendationContext {
    pub user_id: Uuid,
    pub feed_type: FeedType,
    pub date: NaiveDate,
    pub seen_resource_ids: HashSet<Uuid>,
    pub recently_recommended_ids: HashSet<Uuid>,
    pub signals: UserSignals,
}

impl RecommendationContext {
    pub fn new(user_id: Uuid, feed_type: FeedType, date: NaiveDate) -> Self {
        Self {
            user_id,
            feed_type,
            date,
            seen_resource_ids: HashSet::new(),
            recently_recommended_ids: HashSet::new(),
            signals: UserSignals::default(),
        }
    }

    /// True if the user viewed the resource or was shown it recently
    pub fn is_excluded(&self, resource_id: &Uuid) -> bool {
        self.seen_resource_ids.contains(resource_id)
            || self.recently_recommended_ids.contains(resource_id)
    }

    pub fn vote_for(&self, resource_id: &Uuid) -> Option<Vote> {
        self.signals.votes.get(resource_id).copied()
    }
}
