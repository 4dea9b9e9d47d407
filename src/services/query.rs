use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    db::{RecommendationStore, UserStore},
    error::{AppError, AppResult},
    models::{FeedRecommendations, FeedType, RecommendationKey},
};

/// Read path for persisted recommendations
///
/// When the requested date has no rows for a feed, serves the most recent
/// earlier date that does and reports it as the effective date.
pub struct RecommendationQueryService {
    users: Arc<dyn UserStore>,
    recommendations: Arc<dyn RecommendationStore>,
}

impl RecommendationQueryService {
    pub fn new(users: Arc<dyn UserStore>, recommendations: Arc<dyn RecommendationStore>) -> Self {
        Self {
            users,
            recommendations,
        }
    }

    /// `Ok(None)` when neither `date` nor any earlier date holds rows
    pub async fn get_feed_recommendations(
        &self,
        user_id: Uuid,
        feed_type: FeedType,
        date: NaiveDate,
    ) -> AppResult<Option<FeedRecommendations>> {
        self.ensure_user(user_id).await?;
        self.feed_with_fallback(user_id, feed_type, date).await
    }

    /// Every non-empty feed for today (UTC), in `FeedType::ALL` order
    pub async fn get_todays_recommendations(
        &self,
        user_id: Uuid,
    ) -> AppResult<Vec<FeedRecommendations>> {
        self.get_recommendations_for_date(user_id, Utc::now().date_naive())
            .await
    }

    pub async fn get_recommendations_for_date(
        &self,
        user_id: Uuid,
        date: NaiveDate,
    ) -> AppResult<Vec<FeedRecommendations>> {
        self.ensure_user(user_id).await?;

        let mut feeds = Vec::new();
        for feed_type in FeedType::ALL {
            if let Some(feed) = self.feed_with_fallback(user_id, feed_type, date).await? {
                feeds.push(feed);
            }
        }
        Ok(feeds)
    }

    async fn ensure_user(&self, user_id: Uuid) -> AppResult<()> {
        if !self.users.exists(user_id).await? {
            return Err(AppError::NotFound(format!("User {} not found", user_id)));
        }
        Ok(())
    }

    async fn feed_with_fallback(
        &self,
        user_id: Uuid,
        feed_type: FeedType,
        requested: NaiveDate,
    ) -> AppResult<Option<FeedRecommendations>> {
        let rows = self
            .recommendations
            .find_by_key(&RecommendationKey::new(user_id, feed_type, requested))
            .await?;
        if !rows.is_empty() {
            return Ok(Some(FeedRecommendations::new(feed_type, requested, requested, rows)));
        }

        let Some(fallback) = self
            .recommendations
            .latest_date_before(user_id, feed_type, requested)
            .await?
        else {
            return Ok(None);
        };

        let rows = self
            .recommendations
            .find_by_key(&RecommendationKey::new(user_id, feed_type, fallback))
            .await?;
        if rows.is_empty() {
            return Ok(None);
        }

        tracing::debug!(
            user_id = %user_id,
            feed_type = %feed_type,
            requested = %requested,
            effective = %fallback,
            "Serving fallback recommendations"
        );
        Ok(Some(FeedRecommendations::new(feed_type, requested, fallback, rows)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, MockRecommendationStore, MockUserStore};
    use crate::models::UserSignals;
    use crate::test_support::{date, recommendation, resource};

    async fn service_with_user() -> (RecommendationQueryService, Arc<MemoryStore>, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let user_id = Uuid::new_v4();
        store.add_user(user_id, UserSignals::default()).await;
        let service = RecommendationQueryService::new(store.clone(), store.clone());
        (service, store, user_id)
    }

    async fn persist(store: &MemoryStore, key: RecommendationKey, positions: &[u32]) {
        let rows = positions
            .iter()
            .map(|position| recommendation(&key, resource(key.feed_type), *position))
            .collect();
        store.replace_for_key(&key, rows).await.unwrap();
    }

    #[tokio::test]
    async fn test_falls_back_to_most_recent_earlier_date() {
        let (service, store, user_id) = service_with_user().await;
        persist(
            &store,
            RecommendationKey::new(user_id, FeedType::Paper, date(2024, 11, 28)),
            &[0],
        )
        .await;
        persist(
            &store,
            RecommendationKey::new(user_id, FeedType::Paper, date(2024, 11, 30)),
            &[2, 1],
        )
        .await;

        let feed = service
            .get_feed_recommendations(user_id, FeedType::Paper, date(2024, 12, 1))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(feed.date, date(2024, 11, 30));
        assert_eq!(feed.requested_date, date(2024, 12, 1));
        assert!(feed.is_fallback);
        assert_eq!(
            feed.recommendations.iter().map(|r| r.position).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[tokio::test]
    async fn test_exact_date_is_not_fallback() {
        let (service, store, user_id) = service_with_user().await;
        let key = RecommendationKey::new(user_id, FeedType::Video, date(2024, 12, 1));
        persist(&store, key, &[0, 1]).await;

        let feed = service
            .get_feed_recommendations(user_id, FeedType::Video, key.date)
            .await
            .unwrap()
            .unwrap();
        assert!(!feed.is_fallback);
        assert_eq!(feed.date, key.date);
        assert_eq!(feed.recommendations.len(), 2);
    }

    #[tokio::test]
    async fn test_later_dates_are_never_served() {
        let (service, store, user_id) = service_with_user().await;
        persist(
            &store,
            RecommendationKey::new(user_id, FeedType::Paper, date(2024, 12, 2)),
            &[0],
        )
        .await;

        let feed = service
            .get_feed_recommendations(user_id, FeedType::Paper, date(2024, 12, 1))
            .await
            .unwrap();
        assert!(feed.is_none());
    }

    #[tokio::test]
    async fn test_recommendations_for_date_omit_empty_feeds() {
        let (service, store, user_id) = service_with_user().await;
        let day = date(2024, 12, 1);
        persist(&store, RecommendationKey::new(user_id, FeedType::Video, day), &[0]).await;
        persist(
            &store,
            RecommendationKey::new(user_id, FeedType::Paper, date(2024, 11, 29)),
            &[0],
        )
        .await;

        let feeds = service.get_recommendations_for_date(user_id, day).await.unwrap();
        assert_eq!(
            feeds.iter().map(|f| f.feed_type).collect::<Vec<_>>(),
            vec![FeedType::Paper, FeedType::Video]
        );
        assert!(feeds[0].is_fallback);
        assert!(!feeds[1].is_fallback);
    }

    #[tokio::test]
    async fn test_todays_recommendations_use_current_date() {
        let (service, store, user_id) = service_with_user().await;
        let today = Utc::now().date_naive();
        persist(&store, RecommendationKey::new(user_id, FeedType::BlogPost, today), &[0]).await;

        let feeds = service.get_todays_recommendations(user_id).await.unwrap();
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].date, today);
    }

    #[tokio::test]
    async fn test_missing_user_is_not_found() {
        let mut users = MockUserStore::new();
        users.expect_exists().returning(|_| Ok(false));
        let mut recommendations = MockRecommendationStore::new();
        recommendations.expect_find_by_key().never();

        let service = RecommendationQueryService::new(Arc::new(users), Arc::new(recommendations));

        let single = service
            .get_feed_recommendations(Uuid::new_v4(), FeedType::Paper, date(2024, 12, 1))
            .await;
        assert!(matches!(single, Err(AppError::NotFound(_))));

        let today = service.get_todays_recommendations(Uuid::new_v4()).await;
        assert!(matches!(today, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let mut users = MockUserStore::new();
        users.expect_exists().returning(|_| Ok(true));
        let mut recommendations = MockRecommendationStore::new();
        recommendations
            .expect_find_by_key()
            .returning(|_| Err(AppError::Internal("connection reset".to_string())));

        let service = RecommendationQueryService::new(Arc::new(users), Arc::new(recommendations));
        let result = service
            .get_feed_recommendations(Uuid::new_v4(), FeedType::Paper, date(2024, 12, 1))
            .await;
        assert!(matches!(result, Err(AppError::Internal(_))));
    }
}
