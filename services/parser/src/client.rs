//! Paginated client for the public 2GIS reviews API.
//!
//! One request fetches one page; `fetch_all` walks the whole tail for a
//! branch with a politeness delay between pages and never issues
//! concurrent requests for the same branch.

use std::time::Duration;

use reviews_core::normalize::{normalize_review, ReviewsPage};
use reviews_core::NewReview;
use tracing::{debug, warn};

const BASE_URL: &str = "https://public-api.reviews.2gis.com/2.0/branches";
const FIELDS: &str = "meta.providers,meta.branch_rating,meta.branch_reviews_count,meta.total_count,reviews.hiding_reason,reviews.is_verified";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("branch {branch_id}: upstream returned {status}")]
    Status {
        branch_id: String,
        status: reqwest::StatusCode,
    },
}

#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub api_key: String,
    pub locale: String,
    pub page_size: i64,
    /// Sleep between successive pages of one branch.
    pub request_delay: Duration,
    pub http_timeout: Duration,
}

#[derive(Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    config: UpstreamConfig,
}

impl UpstreamClient {
    pub fn new(config: UpstreamConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(USER_AGENT)
            .build()
            .expect("failed to build HTTP client");
        Self { http, config }
    }

    /// Fetch one page of reviews at the given offset.
    pub async fn fetch_page(
        &self,
        branch_id: &str,
        offset: i64,
    ) -> Result<ReviewsPage, UpstreamError> {
        let url = format!("{BASE_URL}/{branch_id}/reviews");
        let limit = self.config.page_size.to_string();
        let offset = offset.to_string();
        let response = self
            .http
            .get(&url)
            .query(&[
                ("is_advertiser", "false"),
                ("fields", FIELDS),
                ("without_my_first_review", "false"),
                ("rated", "true"),
                ("sort_by", "date_edited"),
                ("locale", self.config.locale.as_str()),
                ("key", self.config.api_key.as_str()),
                ("limit", limit.as_str()),
                ("offset", offset.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                branch_id: branch_id.to_owned(),
                status,
            });
        }
        Ok(response.json().await?)
    }

    /// Walk every page for a branch, newest-edited first, and return the
    /// normalized records. Records without an `id` are dropped with a
    /// warning.
    pub async fn fetch_all(
        &self,
        branch_id: &str,
        branch_name: &str,
    ) -> Result<Vec<NewReview>, UpstreamError> {
        let mut all = Vec::new();
        let mut offset = 0i64;
        loop {
            debug!(branch = %branch_name, offset, "fetching reviews page");
            let page = self.fetch_page(branch_id, offset).await?;
            if page.reviews.is_empty() {
                break;
            }
            for raw in &page.reviews {
                match normalize_review(raw, branch_id, branch_name) {
                    Some(review) => all.push(review),
                    None => {
                        warn!(
                            branch = %branch_name,
                            text = %raw.text.chars().take(50).collect::<String>(),
                            "dropping review without an id"
                        );
                    }
                }
            }
            if !has_more(offset, self.config.page_size, page.meta.total_count) {
                break;
            }
            offset += self.config.page_size;
            tokio::time::sleep(self.config.request_delay).await;
        }
        Ok(all)
    }
}

/// Pagination continues while the upstream claims more records past the
/// window just fetched.
fn has_more(offset: i64, limit: i64, total_count: i64) -> bool {
    offset + limit < total_count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_stops_at_total_count() {
        // 75 records, pages of 50: the second window covers the rest.
        assert!(has_more(0, 50, 75));
        assert!(!has_more(50, 50, 75));
        // Exact multiple: the last full page is also the final one.
        assert!(!has_more(50, 50, 100));
        assert!(has_more(0, 50, 100));
        // Empty branch.
        assert!(!has_more(0, 50, 0));
    }
}
