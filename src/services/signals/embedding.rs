//! Embedding similarity backed by the vector search service
//!
//! The search service holds both user interest embeddings and resource
//! embeddings and answers pairwise cosine similarity. Answers are cached in
//! Redis since embeddings only change when ingestion re-embeds a resource.

use reqwest::Client as HttpClient;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    services::signals::SimilarityProvider,
};

#[derive(Debug, Deserialize)]
struct SimilarityResponse {
    similarity: Option<f64>,
}

#[derive(Clone)]
pub struct HttpSimilarityProvider {
    http_client: HttpClient,
    api_url: String,
    api_key: Option<String>,
    cache: Cache,
    cache_ttl: u64,
}

impl HttpSimilarityProvider {
    pub fn new(cache: Cache, api_url: String, api_key: Option<String>, cache_ttl: u64) -> Self {
        Self {
            http_client: HttpClient::new(),
            api_url,
            api_key,
            cache,
            cache_ttl,
        }
    }

    fn similarity_url(&self) -> String {
        format!("{}/v1/similarity", self.api_url.trim_end_matches('/'))
    }

    fn parse_response(body: SimilarityResponse) -> AppResult<f64> {
        body.similarity
            .filter(|similarity| similarity.is_finite())
            .ok_or_else(|| {
                AppError::ExternalApi("Similarity response missing a finite score".to_string())
            })
    }

    async fn fetch_similarity(&self, user_id: Uuid, resource_id: Uuid) -> AppResult<f64> {
        let mut request = self.http_client.get(self.similarity_url()).query(&[
            ("user_id", user_id.to_string()),
            ("resource_id", resource_id.to_string()),
        ]);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Similarity API returned status {}: {}",
                status, body
            )));
        }

        let body: SimilarityResponse = response.json().await?;
        let similarity = Self::parse_response(body)?;

        tracing::debug!(
            user_id = %user_id,
            resource_id = %resource_id,
            similarity,
            "Similarity fetched"
        );

        Ok(similarity)
    }
}

#[async_trait::async_trait]
impl SimilarityProvider for HttpSimilarityProvider {
    async fn similarity(&self, user_id: Uuid, resource_id: Uuid) -> AppResult<f64> {
        cached!(
            self.cache,
            CacheKey::Similarity {
                user_id,
                resource_id
            },
            self.cache_ttl,
            self.fetch_similarity(user_id, resource_id)
        )
    }
}
