//! Read-only relevance signal providers.
//!
//! Providers may be network-bound. Scorers call them once per candidate, so
//! the generator bounds how many lookups are outstanding at a time.
use uuid::Uuid;

use crate::error::AppResult;

pub mod embedding;

pub use embedding::HttpSimilarityProvider;

/// Embedding similarity between a user's interest profile and a resource
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SimilarityProvider: Send + Sync {
    /// Cosine similarity in `[-1, 1]`
    async fn similarity(&self, user_id: Uuid, resource_id: Uuid) -> AppResult<f64>;
}

/// Community vote counts
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait PopularityProvider: Send + Sync {
    /// Upvotes minus downvotes across all users
    async fn net_votes(&self, resource_id: Uuid) -> AppResult<i64>;
}
