//! Fixtures shared by unit tests.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use crate::models::{
    FeedType, Recommendation, RecommendationContext, RecommendationKey, Resource, ScoredResource,
};

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn created_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 11, 20, 8, 0, 0).unwrap()
}

pub fn resource(feed_type: FeedType) -> Resource {
    let id = Uuid::new_v4();
    Resource {
        id,
        title: format!("Resource {}", id),
        url: format!("https://example.org/{}", id),
        description: String::new(),
        published_date: None,
        feed_type,
        source: None,
        created_at: created_at(),
        updated_at: created_at(),
        topics: Vec::new(),
    }
}

pub fn context(feed_type: FeedType) -> RecommendationContext {
    RecommendationContext::new(Uuid::new_v4(), feed_type, date(2024, 12, 1))
}

pub fn recommendation(
    key: &RecommendationKey,
    resource: Resource,
    position: u32,
) -> Recommendation {
    let mut scored = ScoredResource::unscored(resource);
    scored.final_score = 0.5;
    Recommendation::new(key, scored, position, created_at())
}
