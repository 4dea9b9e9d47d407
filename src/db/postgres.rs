use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::store::{validate_rows, RecommendationStore, ResourceStore, UserStore, ViewHistory};
use crate::{
    error::{AppError, AppResult},
    models::{FeedType, Recommendation, RecommendationKey, Resource, Topic, UserSignals, Vote},
    services::signals::PopularityProvider,
};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Postgres-backed implementation of the pipeline's storage collaborators
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn topics_for(&self, resource_ids: &[Uuid]) -> AppResult<HashMap<Uuid, Vec<Topic>>> {
        if resource_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, TopicRow>(
            r#"
            SELECT rt.resource_id, t.id, t.name
            FROM resource_topics rt
            JOIN topics t ON t.id = rt.topic_id
            WHERE rt.resource_id = ANY($1)
            ORDER BY t.name
            "#,
        )
        .bind(resource_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut topics: HashMap<Uuid, Vec<Topic>> = HashMap::new();
        for row in rows {
            topics.entry(row.resource_id).or_default().push(Topic {
                id: row.id,
                name: row.name,
            });
        }
        Ok(topics)
    }
}

#[derive(sqlx::FromRow)]
struct ResourceRow {
    id: Uuid,
    title: String,
    url: String,
    description: String,
    published_date: Option<NaiveDate>,
    feed_type: String,
    source: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct TopicRow {
    resource_id: Uuid,
    id: Uuid,
    name: String,
}

#[derive(sqlx::FromRow)]
struct RecommendationRow {
    id: Uuid,
    user_id: Uuid,
    feed_type: String,
    date: NaiveDate,
    resource_id: Uuid,
    resource: Json<Resource>,
    position: i32,
    score: f64,
    generated_at: DateTime<Utc>,
}

impl TryFrom<RecommendationRow> for Recommendation {
    type Error = AppError;

    fn try_from(row: RecommendationRow) -> Result<Self, Self::Error> {
        let position = u32::try_from(row.position).map_err(|_| {
            AppError::Internal(format!(
                "Negative position {} on recommendation {}",
                row.position, row.id
            ))
        })?;

        Ok(Recommendation {
            id: row.id,
            user_id: row.user_id,
            feed_type: row.feed_type.parse()?,
            date: row.date,
            resource_id: row.resource_id,
            resource: row.resource.0,
            position,
            score: row.score,
            generated_at: row.generated_at,
        })
    }
}

#[async_trait::async_trait]
impl ResourceStore for PgStore {
    async fn list_eligible(&self, feed_type: FeedType) -> AppResult<Vec<Resource>> {
        let rows = sqlx::query_as::<_, ResourceRow>(
            r#"
            SELECT id, title, url, description, published_date, feed_type, source,
                   created_at, updated_at
            FROM resources
            WHERE feed_type = $1 AND active = true
            ORDER BY id
            "#,
        )
        .bind(feed_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let mut topics = self.topics_for(&ids).await?;

        rows.into_iter()
            .map(|row| -> AppResult<Resource> {
                Ok(Resource {
                    topics: topics.remove(&row.id).unwrap_or_default(),
                    id: row.id,
                    title: row.title,
                    url: row.url,
                    description: row.description,
                    published_date: row.published_date,
                    feed_type: row.feed_type.parse()?,
                    source: row.source,
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                })
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl UserStore for PgStore {
    async fn exists(&self, user_id: Uuid) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn signals(&self, user_id: Uuid) -> AppResult<UserSignals> {
        let interest_topic_ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT topic_id FROM user_topics WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;

        let vote_rows: Vec<(Uuid, i16)> =
            sqlx::query_as("SELECT resource_id, vote FROM resource_votes WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;

        let votes = vote_rows
            .into_iter()
            .filter_map(|(resource_id, value)| Vote::from_value(value).map(|v| (resource_id, v)))
            .collect();

        Ok(UserSignals {
            interest_topic_ids: interest_topic_ids.into_iter().collect(),
            votes,
        })
    }

    async fn active_user_ids(&self) -> AppResult<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }
}

#[async_trait::async_trait]
impl ViewHistory for PgStore {
    async fn seen_resource_ids(&self, user_id: Uuid) -> AppResult<HashSet<Uuid>> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT resource_id FROM resource_views WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids.into_iter().collect())
    }
}

#[async_trait::async_trait]
impl RecommendationStore for PgStore {
    async fn replace_for_key(
        &self,
        key: &RecommendationKey,
        rows: Vec<Recommendation>,
    ) -> AppResult<()> {
        validate_rows(key, &rows)?;

        let mut tx = self.pool.begin().await?;

        // Serializes concurrent re-runs of the same key
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(key.to_string())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "DELETE FROM recommendations WHERE user_id = $1 AND feed_type = $2 AND date = $3",
        )
        .bind(key.user_id)
        .bind(key.feed_type.as_str())
        .bind(key.date)
        .execute(&mut *tx)
        .await?;

        for row in &rows {
            sqlx::query(
                r#"
                INSERT INTO recommendations
                    (id, user_id, feed_type, date, resource_id, resource, position, score, generated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(row.id)
            .bind(row.user_id)
            .bind(row.feed_type.as_str())
            .bind(row.date)
            .bind(row.resource_id)
            .bind(Json(&row.resource))
            .bind(row.position as i32)
            .bind(row.score)
            .bind(row.generated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(key = %key, rows = rows.len(), "Replaced recommendation set");
        Ok(())
    }

    async fn find_by_key(&self, key: &RecommendationKey) -> AppResult<Vec<Recommendation>> {
        let rows = sqlx::query_as::<_, RecommendationRow>(
            r#"
            SELECT id, user_id, feed_type, date, resource_id, resource, position, score, generated_at
            FROM recommendations
            WHERE user_id = $1 AND feed_type = $2 AND date = $3
            ORDER BY position ASC
            "#,
        )
        .bind(key.user_id)
        .bind(key.feed_type.as_str())
        .bind(key.date)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Recommendation::try_from).collect()
    }

    async fn latest_date_before(
        &self,
        user_id: Uuid,
        feed_type: FeedType,
        before: NaiveDate,
    ) -> AppResult<Option<NaiveDate>> {
        let latest: Option<NaiveDate> = sqlx::query_scalar(
            r#"
            SELECT MAX(date)
            FROM recommendations
            WHERE user_id = $1 AND feed_type = $2 AND date < $3
            "#,
        )
        .bind(user_id)
        .bind(feed_type.as_str())
        .bind(before)
        .fetch_one(&self.pool)
        .await?;
        Ok(latest)
    }

    async fn resource_ids_between(
        &self,
        user_id: Uuid,
        feed_type: FeedType,
        from: NaiveDate,
        to: NaiveDate,
    ) -> AppResult<HashSet<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT resource_id
            FROM recommendations
            WHERE user_id = $1 AND feed_type = $2 AND date >= $3 AND date < $4
            "#,
        )
        .bind(user_id)
        .bind(feed_type.as_str())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().collect())
    }
}

#[async_trait::async_trait]
impl PopularityProvider for PgStore {
    async fn net_votes(&self, resource_id: Uuid) -> AppResult<i64> {
        let net: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(vote), 0)::BIGINT FROM resource_votes WHERE resource_id = $1",
        )
        .bind(resource_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(net)
    }
}
