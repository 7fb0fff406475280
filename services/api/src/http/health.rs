use axum::{extract::State, response::IntoResponse, Json};
use chrono::Utc;
use reviews_store::db;
use reviews_store::repo::{branches, reviews};

use super::response::service_unavailable;
use crate::state::AppState;

/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    if let Err(err) = db::ping(&state.pool).await {
        return service_unavailable(err.to_string());
    }
    let reviews_count = reviews::count_reviews(&state.pool).await.unwrap_or(0);
    let branches_count = branches::count_branches(&state.pool).await.unwrap_or(0);
    let cache_status = if state.cache.is_available().await {
        "connected"
    } else {
        "disconnected"
    };

    Json(serde_json::json!({
        "status": "healthy",
        "database": "connected",
        "cache": cache_status,
        "reviews_count": reviews_count,
        "branches_count": branches_count,
        "timestamp": Utc::now(),
    }))
    .into_response()
}
