pub mod branches;
pub mod reports;
pub mod reviews;
pub mod sessions;
pub mod subscribers;

use chrono::{DateTime, Datelike, Utc};
use reviews_core::format::ReviewCard;
use sqlx::postgres::PgRow;
use sqlx::Row;

/// A stored review row.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReviewRow {
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
    pub sent_to_telegram: bool,
    pub created_at: DateTime<Utc>,
}

impl ReviewRow {
    pub(crate) fn from_row(row: &PgRow) -> Self {
        let photos: serde_json::Value = row.get("photos_urls");
        Self {
            review_id: row.get("review_id"),
            branch_id: row.get("branch_id"),
            branch_name: row.get("branch_name"),
            user_name: row.get("user_name"),
            rating: row.get("rating"),
            text: row.get("text"),
            date_created: row.get("date_created"),
            date_edited: row.get("date_edited"),
            is_verified: row.get("is_verified"),
            likes_count: row.get("likes_count"),
            comments_count: row.get("comments_count"),
            photos_count: row.get("photos_count"),
            photos_urls: serde_json::from_value(photos).unwrap_or_default(),
            sent_to_telegram: row.get("sent_to_telegram"),
            created_at: row.get("created_at"),
        }
    }

    pub fn card(&self) -> ReviewCard<'_> {
        ReviewCard {
            branch_name: &self.branch_name,
            user_name: self.user_name.as_deref().unwrap_or(""),
            rating: self.rating,
            text: &self.text,
            date_created: self.date_created,
            is_verified: self.is_verified,
        }
    }
}

/// The last `count` month keys (`YYYY-MM`), newest first, ending at `now`.
pub fn month_keys(now: DateTime<Utc>, count: u32) -> Vec<String> {
    let mut year = now.year();
    let mut month = now.month();
    let mut keys = Vec::with_capacity(count as usize);
    for _ in 0..count {
        keys.push(format!("{year:04}-{month:02}"));
        if month == 1 {
            month = 12;
            year -= 1;
        } else {
            month -= 1;
        }
    }
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn month_keys_wrap_the_year_boundary() {
        let now = Utc.with_ymd_and_hms(2025, 2, 15, 0, 0, 0).unwrap();
        let keys = month_keys(now, 4);
        assert_eq!(keys, vec!["2025-02", "2025-01", "2024-12", "2024-11"]);
    }

    #[test]
    fn month_keys_full_year() {
        let now = Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap();
        let keys = month_keys(now, 12);
        assert_eq!(keys.len(), 12);
        assert_eq!(keys.first().map(String::as_str), Some("2025-07"));
        assert_eq!(keys.last().map(String::as_str), Some("2024-08"));
    }
}
