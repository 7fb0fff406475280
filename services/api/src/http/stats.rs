use axum::{
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use reviews_cache::{keys, ttl};
use reviews_store::repo::reviews;
use serde::Deserialize;

use super::response::{bad_request, internal_error};
use crate::state::AppState;

/// GET /api/v1/stats
pub async fn general_stats(State(state): State<AppState>) -> impl IntoResponse {
    if let Some(cached) = state
        .cache
        .get_json::<serde_json::Value>(keys::GENERAL_STATS)
        .await
    {
        return Json(cached).into_response();
    }

    match reviews::general_stats(&state.pool).await {
        Ok(stats) => {
            let body = serde_json::json!(stats);
            state
                .cache
                .set_json(keys::GENERAL_STATS, &body, ttl::GENERAL_STATS)
                .await;
            Json(body).into_response()
        }
        Err(err) => internal_error(err),
    }
}

#[derive(Deserialize)]
pub struct RecentQuery {
    #[serde(default = "default_days")]
    pub days: i32,
}

fn default_days() -> i32 {
    7
}

/// GET /api/v1/stats/recent
pub async fn recent_stats(
    State(state): State<AppState>,
    Query(params): Query<RecentQuery>,
) -> impl IntoResponse {
    if !(1..=90).contains(&params.days) {
        return bad_request("days must be between 1 and 90");
    }

    let cache_key = keys::recent_reviews(params.days);
    if let Some(cached) = state.cache.get_json::<serde_json::Value>(&cache_key).await {
        return Json(cached).into_response();
    }

    match reviews::recent_activity(&state.pool, params.days).await {
        Ok(by_date) => {
            let total: i64 = by_date.values().map(|d| d.count).sum();
            let body = serde_json::json!({
                "period_days": params.days,
                "total_reviews": total,
                "reviews_by_date": by_date,
            });
            state
                .cache
                .set_json(&cache_key, &body, ttl::RECENT_REVIEWS)
                .await;
            Json(body).into_response()
        }
        Err(err) => internal_error(err),
    }
}
