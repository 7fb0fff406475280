use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use reviews_cache::{keys, ttl};
use reviews_store::repo::{branches, reviews};
use serde::Deserialize;

use super::response::{bad_request, internal_error, not_found};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct BranchesQuery {
    pub city: Option<String>,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    100
}

/// GET /api/v1/branches
pub async fn list_branches(
    State(state): State<AppState>,
    Query(params): Query<BranchesQuery>,
) -> impl IntoResponse {
    if params.skip < 0 {
        return bad_request("skip must be non-negative");
    }
    if !(1..=1000).contains(&params.limit) {
        return bad_request("limit must be between 1 and 1000");
    }

    // Only the default page is cached; filtered listings are cheap enough.
    let cacheable = params.city.is_none() && params.skip == 0 && params.limit == 100;
    if cacheable {
        if let Some(cached) = state
            .cache
            .get_json::<serde_json::Value>(keys::BRANCHES_LIST)
            .await
        {
            return Json(cached).into_response();
        }
    }

    let summaries = match branches::list_with_stats(
        &state.pool,
        params.city.as_deref(),
        params.skip,
        params.limit,
    )
    .await
    {
        Ok(summaries) => summaries,
        Err(err) => return internal_error(err),
    };
    let body = serde_json::json!(summaries);

    if cacheable {
        state
            .cache
            .set_json(keys::BRANCHES_LIST, &body, ttl::BRANCHES_LIST)
            .await;
    }
    Json(body).into_response()
}

/// GET /api/v1/branches/:branch_id/stats
pub async fn branch_stats(
    State(state): State<AppState>,
    Path(branch_id): Path<String>,
) -> impl IntoResponse {
    let cache_key = keys::branch_stats(&branch_id);
    if let Some(cached) = state.cache.get_json::<serde_json::Value>(&cache_key).await {
        return Json(cached).into_response();
    }

    let branch = match branches::get_branch(&state.pool, &branch_id).await {
        Ok(Some(branch)) => branch,
        Ok(None) => return not_found("Branch not found"),
        Err(err) => return internal_error(err),
    };
    let stats = match reviews::branch_stats(&state.pool, &branch_id).await {
        Ok(stats) => stats,
        Err(err) => return internal_error(err),
    };

    let body = serde_json::json!({
        "branch_id": branch.branch_id,
        "branch_name": branch.branch_name,
        "total_reviews": stats.total_reviews,
        "average_rating": stats.average_rating,
        "rating_distribution": stats.rating_distribution,
        "verified_count": stats.verified_count,
        "last_review_date": stats.last_review_date,
    });
    state
        .cache
        .set_json(&cache_key, &body, ttl::BRANCH_STATS)
        .await;
    Json(body).into_response()
}
