pub mod branches;
pub mod cache_admin;
pub mod health;
pub mod response;
pub mod reviews;
pub mod stats;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use reviews_store::repo::ReviewRow;

/// Review as exposed by the API: the dispatch flag and row ids stay
/// internal.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewResponse {
    pub review_id: String,
    pub branch_id: String,
    pub branch_name: String,
    pub user_name: Option<String>,
    pub rating: Option<i32>,
    pub text: String,
    pub date_created: Option<DateTime<Utc>>,
    pub date_edited: Option<DateTime<Utc>>,
    pub is_verified: bool,
    pub likes_count: i32,
    pub comments_count: i32,
    pub photos_count: i32,
    pub photos_urls: Vec<String>,
}

impl From<ReviewRow> for ReviewResponse {
    fn from(row: ReviewRow) -> Self {
        Self {
            review_id: row.review_id,
            branch_id: row.branch_id,
            branch_name: row.branch_name,
            user_name: row.user_name,
            rating: row.rating,
            text: row.text,
            date_created: row.date_created,
            date_edited: row.date_edited,
            is_verified: row.is_verified,
            likes_count: row.likes_count,
            comments_count: row.comments_count,
            photos_count: row.photos_count,
            photos_urls: row.photos_urls,
        }
    }
}

/// Accept either a full RFC 3339 timestamp or a bare date (read as
/// midnight UTC) in date filters.
pub fn parse_date_param(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn date_param_accepts_both_shapes() {
        assert_eq!(
            parse_date_param("2024-05-01"),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            parse_date_param("2024-05-01T12:30:00Z"),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap())
        );
        assert_eq!(parse_date_param("May 2024"), None);
    }
}
