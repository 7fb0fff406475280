use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A review normalized from the upstream payload, ready for insertion.
///
/// `review_id` is the upstream-assigned identifier and the sole
/// deduplication key; two records with the same `review_id` are the same
/// review regardless of any other field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewReview {
    pub review_id: String,
    pub branch_id: String,
    pub branch_name: String,
    pub user_name: String,
    /// 1..=5; `None` for the rare upstream record with no rating.
    pub rating: Option<i32>,
    pub text: String,
    pub date_created: Option<DateTime<Utc>>,
    pub date_edited: Option<DateTime<Utc>>,
    pub is_verified: bool,
    pub likes_count: i32,
    pub comments_count: i32,
    /// Absolute image URLs, at most one per upstream photo.
    pub photos_urls: Vec<String>,
}

impl NewReview {
    pub fn photos_count(&self) -> i32 {
        i32::try_from(self.photos_urls.len()).unwrap_or(i32::MAX)
    }
}

/// Roster entry for a single retail location.
///
/// `branch_id` is the 2GIS identifier; the two aliases tie the branch to
/// other internal systems and may be absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterBranch {
    pub branch_id: String,
    pub name: String,
    pub id_steady: Option<String>,
    pub id_iiko: Option<String>,
}
