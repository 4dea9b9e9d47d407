use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::AppState;
use crate::{
    error::{AppError, AppResult},
    models::{FeedRecommendations, FeedType},
};

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    /// `YYYY-MM-DD`, defaults to today (UTC)
    date: Option<String>,
}

/// Today's non-empty feeds for a user
pub async fn today(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Vec<FeedRecommendations>>> {
    let feeds = state.query.get_todays_recommendations(user_id).await?;
    Ok(Json(feeds))
}

/// One feed for a user, falling back to the most recent earlier date
pub async fn feed(
    State(state): State<AppState>,
    Path((user_id, feed_type)): Path<(Uuid, String)>,
    Query(params): Query<FeedQuery>,
) -> AppResult<Json<FeedRecommendations>> {
    let feed_type: FeedType = feed_type.parse()?;
    let date = parse_date(params.date.as_deref())?;

    let feed = state
        .query
        .get_feed_recommendations(user_id, feed_type, date)
        .await?
        .unwrap_or_else(|| FeedRecommendations::empty(feed_type, date));
    Ok(Json(feed))
}

fn parse_date(raw: Option<&str>) -> AppResult<NaiveDate> {
    match raw {
        None => Ok(Utc::now().date_naive()),
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map_err(|_| AppError::InvalidInput(format!("Invalid date: {}", raw))),
    }
}
