use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use super::store::{validate_rows, RecommendationStore, ResourceStore, UserStore, ViewHistory};
use crate::{
    error::AppResult,
    models::{FeedType, Recommendation, RecommendationKey, Resource, UserSignals, Vote},
};

/// Process-local store implementing every pipeline collaborator
///
/// Backs local runs and tests. A replace holds the write lock for the whole
/// swap, so readers see either the old set or the new set.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryStoreInner>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    resources: HashMap<Uuid, (Resource, bool)>,
    users: HashMap<Uuid, UserSignals>,
    views: HashMap<Uuid, HashSet<Uuid>>,
    recommendations: BTreeMap<RecommendationKey, Vec<Recommendation>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user_id: Uuid, signals: UserSignals) {
        self.inner.write().await.users.insert(user_id, signals);
    }

    pub async fn add_resource(&self, resource: Resource) {
        self.inner
            .write()
            .await
            .resources
            .insert(resource.id, (resource, true));
    }

    /// Marks a resource inactive so it is no longer a candidate
    pub async fn deactivate_resource(&self, resource_id: Uuid) {
        if let Some(entry) = self.inner.write().await.resources.get_mut(&resource_id) {
            entry.1 = false;
        }
    }

    pub async fn record_view(&self, user_id: Uuid, resource_id: Uuid) {
        self.inner
            .write()
            .await
            .views
            .entry(user_id)
            .or_default()
            .insert(resource_id);
    }

    pub async fn record_vote(&self, user_id: Uuid, resource_id: Uuid, vote: Vote) {
        if let Some(signals) = self.inner.write().await.users.get_mut(&user_id) {
            signals.votes.insert(resource_id, vote);
        }
    }

    /// Every stored row across all keys
    pub async fn all_recommendations(&self) -> Vec<Recommendation> {
        self.inner
            .read()
            .await
            .recommendations
            .values()
            .flatten()
            .cloned()
            .collect()
    }
}

#[async_trait::async_trait]
impl ResourceStore for MemoryStore {
    async fn list_eligible(&self, feed_type: FeedType) -> AppResult<Vec<Resource>> {
        let inner = self.inner.read().await;
        let mut resources: Vec<Resource> = inner
            .resources
            .values()
            .filter(|(resource, active)| *active && resource.feed_type == feed_type)
            .map(|(resource, _)| resource.clone())
            .collect();
        resources.sort_by_key(|resource| resource.id);
        Ok(resources)
    }
}

#[async_trait::async_trait]
impl UserStore for MemoryStore {
    async fn exists(&self, user_id: Uuid) -> AppResult<bool> {
        Ok(self.inner.read().await.users.contains_key(&user_id))
    }

    async fn signals(&self, user_id: Uuid) -> AppResult<UserSignals> {
        Ok(self
            .inner
            .read()
            .await
            .users
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn active_user_ids(&self) -> AppResult<Vec<Uuid>> {
        let mut ids: Vec<Uuid> = self.inner.read().await.users.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}

#[async_trait::async_trait]
impl ViewHistory for MemoryStore {
    async fn seen_resource_ids(&self, user_id: Uuid) -> AppResult<HashSet<Uuid>> {
        Ok(self
            .inner
            .read()
            .await
            .views
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl RecommendationStore for MemoryStore {
    async fn replace_for_key(
        &self,
        key: &RecommendationKey,
        mut rows: Vec<Recommendation>,
    ) -> AppResult<()> {
        validate_rows(key, &rows)?;
        rows.sort_by_key(|row| row.position);

        let mut inner = self.inner.write().await;
        if rows.is_empty() {
            inner.recommendations.remove(key);
        } else {
            inner.recommendations.insert(*key, rows);
        }
        Ok(())
    }

    async fn find_by_key(&self, key: &RecommendationKey) -> AppResult<Vec<Recommendation>> {
        Ok(self
            .inner
            .read()
            .await
            .recommendations
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn latest_date_before(
        &self,
        user_id: Uuid,
        feed_type: FeedType,
        before: NaiveDate,
    ) -> AppResult<Option<NaiveDate>> {
        let inner = self.inner.read().await;
        Ok(inner
            .recommendations
            .iter()
            .filter(|(key, rows)| {
                key.user_id == user_id
                    && key.feed_type == feed_type
                    && key.date < before
                    && !rows.is_empty()
            })
            .map(|(key, _)| key.date)
            .max())
    }

    async fn resource_ids_between(
        &self,
        user_id: Uuid,
        feed_type: FeedType,
        from: NaiveDate,
        to: NaiveDate,
    ) -> AppResult<HashSet<Uuid>> {
        let inner = self.inner.read().await;
        Ok(inner
            .recommendations
            .iter()
            .filter(|(key, _)| {
                key.user_id == user_id
                    && key.feed_type == feed_type
                    && key.date >= from
                    && key.date < to
            })
            .flat_map(|(_, rows)| rows.iter().map(|row| row.resource_id))
            .collect())
    }
}
