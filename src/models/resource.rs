use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::FeedType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub id: Uuid,
    pub name: String,
}

/// A learning item produced by ingestion
///
/// Read-only to the recommendation pipeline. A copy is stored alongside each
/// persisted recommendation so reads never join back to the resource table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Uuid,
    pub title: String,
    pub url: String,
    pub description: String,
    pub published_date: Option<NaiveDate>,
    pub feed_type: FeedType,
    /// Where the resource was found (site, channel, account)
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub topics: Vec<Topic>,
}

impl Resource {
    pub fn topic_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.topics.iter().map(|topic| topic.id)
    }

    /// Date used for freshness: publication date if known, otherwise ingestion date
    pub fn reference_date(&self) -> NaiveDate {
        self.published_date
            .unwrap_or_else(|| self.created_at.date_naive())
    }
}
