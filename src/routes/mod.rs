use axum::{http::StatusCode, middleware, routing::get, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    middleware::{make_span_with_request_id, request_id_middleware},
    services::RecommendationQueryService,
};

pub mod recommendations;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub query: Arc<RecommendationQueryService>,
}

impl AppState {
    pub fn new(query: RecommendationQueryService) -> Self {
        Self {
            query: Arc::new(query),
        }
    }
}

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        .layer(middleware::from_fn(request_id_middleware))
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/users/:user_id/recommendations/today",
            get(recommendations::today),
        )
        .route(
            "/users/:user_id/recommendations/:feed_type",
            get(recommendations::feed),
        )
}

async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
