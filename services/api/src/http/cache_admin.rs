use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};

use crate::state::AppState;

/// GET /api/v1/cache/stats
pub async fn cache_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.cache.stats().await)
}

/// POST /api/v1/cache/clear
pub async fn clear_cache(State(state): State<AppState>) -> impl IntoResponse {
    state.cache.invalidate_all().await;
    Json(serde_json::json!({"message": "Cache cleared successfully"}))
}

/// POST /api/v1/cache/clear/:branch_id
pub async fn clear_branch_cache(
    State(state): State<AppState>,
    Path(branch_id): Path<String>,
) -> impl IntoResponse {
    state.cache.invalidate_branch(&branch_id).await;
    Json(serde_json::json!({
        "message": format!("Cache cleared for branch {branch_id}")
    }))
}
