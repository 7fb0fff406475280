//! Read-only HTTP/JSON surface over the review store, fronted by the
//! cache.

pub mod http;
pub mod state;

pub use state::AppState;

use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowHeaders, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub const DEFAULT_ALLOWED_ORIGIN: &str = "https://reviews.aqniet.site";

pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(http::health::health))
        .route("/api/v1/branches", get(http::branches::list_branches))
        .route(
            "/api/v1/branches/:branch_id/stats",
            get(http::branches::branch_stats),
        )
        .route("/api/v1/reviews", get(http::reviews::list_reviews))
        .route("/api/v1/reviews/:review_id", get(http::reviews::get_review))
        .route("/api/v1/stats", get(http::stats::general_stats))
        .route("/api/v1/stats/recent", get(http::stats::recent_stats))
        .route("/api/v1/cache/stats", get(http::cache_admin::cache_stats))
        .route("/api/v1/cache/clear", post(http::cache_admin::clear_cache))
        .route(
            "/api/v1/cache/clear/:branch_id",
            post(http::cache_admin::clear_branch_cache),
        )
        .route(
            "/api/v1/by-iiko/:id_iiko/:count",
            get(http::reviews::latest_by_iiko),
        )
        // Static segments above take priority over this catch-all pair.
        .route(
            "/api/v1/:branch_id/:count",
            get(http::reviews::latest_by_branch),
        )
        .layer(cors_layer(allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.trim().parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// Parse the comma-separated `CORS_ALLOWED_ORIGINS` value.
pub fn parse_allowed_origins(raw: Option<&str>) -> Vec<String> {
    let raw = raw.unwrap_or(DEFAULT_ALLOWED_ORIGIN);
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_default_when_unset() {
        assert_eq!(
            parse_allowed_origins(None),
            vec![DEFAULT_ALLOWED_ORIGIN.to_owned()]
        );
    }

    #[test]
    fn origins_split_and_trim() {
        let parsed =
            parse_allowed_origins(Some("https://a.example, https://b.example ,,https://c.example"));
        assert_eq!(
            parsed,
            vec![
                "https://a.example".to_owned(),
                "https://b.example".to_owned(),
                "https://c.example".to_owned()
            ]
        );
    }
}
