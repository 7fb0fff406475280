use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use reviews_cache::{keys, ttl};
use reviews_store::repo::branches;
use reviews_store::repo::reviews::{self, ReviewFilter, SortBy};
use serde::Deserialize;

use super::response::{bad_request, internal_error, not_found};
use super::{parse_date_param, ReviewResponse};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ReviewsQuery {
    pub branch_id: Option<String>,
    pub rating: Option<i32>,
    #[serde(default)]
    pub verified_only: bool,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub search: Option<String>,
    #[serde(default = "default_sort_by")]
    pub sort_by: String,
    #[serde(default = "default_order")]
    pub order: String,
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_sort_by() -> String {
    "date_created".to_owned()
}
fn default_order() -> String {
    "desc".to_owned()
}
fn default_limit() -> i64 {
    100
}

/// GET /api/v1/reviews
pub async fn list_reviews(
    State(state): State<AppState>,
    Query(params): Query<ReviewsQuery>,
) -> impl IntoResponse {
    let Some(sort_by) = SortBy::parse(&params.sort_by) else {
        return bad_request("sort_by must be one of date_created|rating|likes_count");
    };
    let descending = match params.order.as_str() {
        "desc" => true,
        "asc" => false,
        _ => return bad_request("order must be asc or desc"),
    };
    if let Some(rating) = params.rating {
        if !(1..=5).contains(&rating) {
            return bad_request("rating must be between 1 and 5");
        }
    }
    if params.skip < 0 {
        return bad_request("skip must be non-negative");
    }
    if !(1..=1000).contains(&params.limit) {
        return bad_request("limit must be between 1 and 1000");
    }
    let date_from = match params.date_from.as_deref() {
        Some(raw) => match parse_date_param(raw) {
            Some(parsed) => Some(parsed),
            None => return bad_request("date_from is not a valid date"),
        },
        None => None,
    };
    let date_to = match params.date_to.as_deref() {
        Some(raw) => match parse_date_param(raw) {
            Some(parsed) => Some(parsed),
            None => return bad_request("date_to is not a valid date"),
        },
        None => None,
    };

    let filter = ReviewFilter {
        branch_id: params.branch_id,
        rating: params.rating,
        verified_only: params.verified_only,
        date_from,
        date_to,
        search: params.search,
        sort_by: Some(sort_by),
        descending,
        skip: params.skip,
        limit: params.limit,
    };
    match reviews::list_filtered(&state.pool, &filter).await {
        Ok(rows) => {
            let body: Vec<ReviewResponse> = rows.into_iter().map(Into::into).collect();
            Json(body).into_response()
        }
        Err(err) => internal_error(err),
    }
}

/// GET /api/v1/reviews/:review_id
pub async fn get_review(
    State(state): State<AppState>,
    Path(review_id): Path<String>,
) -> impl IntoResponse {
    match reviews::get_by_review_id(&state.pool, &review_id).await {
        Ok(Some(row)) => Json(ReviewResponse::from(row)).into_response(),
        Ok(None) => not_found("Review not found"),
        Err(err) => internal_error(err),
    }
}

/// GET /api/v1/:branch_id/:count — the `count` newest reviews of a branch.
pub async fn latest_by_branch(
    State(state): State<AppState>,
    Path((branch_id, count)): Path<(String, i64)>,
) -> impl IntoResponse {
    latest_reviews_response(&state, &branch_id, count).await
}

/// GET /api/v1/by-iiko/:id_iiko/:count — same, via the cross-system id.
pub async fn latest_by_iiko(
    State(state): State<AppState>,
    Path((id_iiko, count)): Path<(String, i64)>,
) -> impl IntoResponse {
    let Some(entry) = state.roster.lookup_by_iiko_id(&id_iiko).await else {
        return not_found(format!(
            "Branch with iiko ID '{id_iiko}' not found in branches registry"
        ));
    };
    latest_reviews_response(&state, &entry.branch_id, count).await
}

async fn latest_reviews_response(
    state: &AppState,
    branch_id: &str,
    count: i64,
) -> axum::response::Response {
    if !(1..=1000).contains(&count) {
        return bad_request("Count must be between 1 and 1000");
    }
    match branches::get_branch(&state.pool, branch_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found("Branch not found"),
        Err(err) => return internal_error(err),
    }

    let cache_key = keys::reviews_page(branch_id, count, 0);
    if let Some(cached) = state.cache.get_json::<serde_json::Value>(&cache_key).await {
        return Json(cached).into_response();
    }

    match reviews::latest_for_branch(&state.pool, branch_id, count).await {
        Ok(rows) => {
            let body: Vec<ReviewResponse> = rows.into_iter().map(Into::into).collect();
            let body = serde_json::json!(body);
            state
                .cache
                .set_json(&cache_key, &body, ttl::REVIEWS_PAGE)
                .await;
            Json(body).into_response()
        }
        Err(err) => internal_error(err),
    }
}
