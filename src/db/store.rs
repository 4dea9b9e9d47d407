//! Storage collaborators consumed by the recommendation pipeline.

use chrono::NaiveDate;
use std::collections::HashSet;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{FeedType, Recommendation, RecommendationKey, Resource, UserSignals},
};

/// Source of candidate resources
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ResourceStore: Send + Sync {
    /// Lists active resources of the given feed type
    async fn list_eligible(&self, feed_type: FeedType) -> AppResult<Vec<Resource>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    async fn exists(&self, user_id: Uuid) -> AppResult<bool>;

    /// Interest topics and vote history
    async fn signals(&self, user_id: Uuid) -> AppResult<UserSignals>;

    /// Users a scheduled batch run should generate for
    async fn active_user_ids(&self) -> AppResult<Vec<Uuid>>;
}

/// View and read history
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ViewHistory: Send + Sync {
    async fn seen_resource_ids(&self, user_id: Uuid) -> AppResult<HashSet<Uuid>>;
}

/// Persisted recommendation sets
///
/// Writes always replace a whole (user, feed type, date) set at once. Readers
/// observe either the previous set or the new one, never a mix.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RecommendationStore: Send + Sync {
    /// Atomically replaces every row stored under `key` with `rows`
    async fn replace_for_key(
        &self,
        key: &RecommendationKey,
        rows: Vec<Recommendation>,
    ) -> AppResult<()>;

    /// Rows stored under `key`, ordered by position
    async fn find_by_key(&self, key: &RecommendationKey) -> AppResult<Vec<Recommendation>>;

    /// Most recent date strictly before `before` with at least one row
    async fn latest_date_before(
        &self,
        user_id: Uuid,
        feed_type: FeedType,
        before: NaiveDate,
    ) -> AppResult<Option<NaiveDate>>;

    /// Resource ids recommended on dates in `[from, to)`
    async fn resource_ids_between(
        &self,
        user_id: Uuid,
        feed_type: FeedType,
        from: NaiveDate,
        to: NaiveDate,
    ) -> AppResult<HashSet<Uuid>>;
}

/// Checks a replacement set against the per-key uniqueness invariants
pub fn validate_rows(key: &RecommendationKey, rows: &[Recommendation]) -> AppResult<()> {
    let mut positions = HashSet::with_capacity(rows.len());
    let mut resources = HashSet::with_capacity(rows.len());

    for row in rows {
        if row.key() != *key {
            return Err(AppError::InvalidInput(format!(
                "Row {} belongs to {} but was written under {}",
                row.id,
                row.key(),
                key
            )));
        }
        if !positions.insert(row.position) {
            return Err(AppError::InvalidInput(format!(
                "Duplicate position {} for {}",
                row.position, key
            )));
        }
        if !resources.insert(row.resource_id) {
            return Err(AppError::InvalidInput(format!(
                "Duplicate resource {} for {}",
                row.resource_id, key
            )));
        }
    }

    Ok(())
}
