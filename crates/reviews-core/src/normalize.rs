//! Upstream payload shapes and normalization.
//!
//! The reviews provider returns loosely-typed JSON; everything past this
//! module works with [`NewReview`] only. Records without an `id` are
//! dropped (the caller decides how to log them), all other missing fields
//! get defaults.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::models::NewReview;

pub const ANONYMOUS_AUTHOR: &str = "Аноним";

/// One page of the upstream reviews listing.
#[derive(Debug, Default, Deserialize)]
pub struct ReviewsPage {
    #[serde(default)]
    pub meta: PageMeta,
    #[serde(default)]
    pub reviews: Vec<RawReview>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageMeta {
    #[serde(default)]
    pub total_count: i64,
    pub branch_rating: Option<f64>,
    pub branch_reviews_count: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawReview {
    pub id: Option<String>,
    #[serde(default)]
    pub user: RawUser,
    pub rating: Option<f64>,
    #[serde(default)]
    pub text: String,
    pub date_created: Option<String>,
    pub date_edited: Option<String>,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub likes_count: i32,
    #[serde(default)]
    pub comments_count: i32,
    #[serde(default)]
    pub photos: Vec<RawPhoto>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawUser {
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawPhoto {
    /// Size key (e.g. `"320x"`, `"1920x"`) → absolute URL.
    #[serde(default)]
    pub preview_urls: BTreeMap<String, String>,
}

/// Normalize one raw record. Returns `None` when the record has no usable
/// `id` and therefore no dedup fingerprint.
pub fn normalize_review(
    raw: &RawReview,
    branch_id: &str,
    branch_name: &str,
) -> Option<NewReview> {
    let review_id = raw.id.as_deref()?.trim();
    if review_id.is_empty() {
        return None;
    }

    let user_name = raw
        .user
        .name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(ANONYMOUS_AUTHOR)
        .to_owned();

    #[allow(clippy::cast_possible_truncation)]
    let rating = raw.rating.map(|r| r as i32);

    Some(NewReview {
        review_id: review_id.to_owned(),
        branch_id: branch_id.to_owned(),
        branch_name: branch_name.to_owned(),
        user_name,
        rating,
        text: raw.text.clone(),
        date_created: raw.date_created.as_deref().and_then(parse_upstream_date),
        date_edited: raw.date_edited.as_deref().and_then(parse_upstream_date),
        is_verified: raw.is_verified,
        likes_count: raw.likes_count,
        comments_count: raw.comments_count,
        photos_urls: raw.photos.iter().filter_map(pick_photo_url).collect(),
    })
}

/// Parse an upstream timestamp. ISO-8601 with `Z` or an explicit offset is
/// the normal case; `YYYY-MM-DD HH:MM:SS` shows up in older records and is
/// read as UTC.
pub fn parse_upstream_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Pick one URL per photo: the largest-dimension key wins; when no key has
/// a parseable dimension, fall back to the first key in order.
fn pick_photo_url(photo: &RawPhoto) -> Option<String> {
    let best_sized = photo
        .preview_urls
        .iter()
        .filter_map(|(key, url)| key_dimension(key).map(|dim| (dim, url)))
        .max_by_key(|(dim, _)| *dim);
    if let Some((_, url)) = best_sized {
        return Some(url.clone());
    }
    photo.preview_urls.values().next().cloned()
}

/// `"1920x"` → 1920, `"320x240"` → 320. Keys like `"url"` have no dimension.
fn key_dimension(key: &str) -> Option<u32> {
    let digits: String = key.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn raw_from_json(json: &str) -> RawReview {
        serde_json::from_str(json).expect("raw review json")
    }

    #[test]
    fn normalizes_full_record() {
        let raw = raw_from_json(
            r#"{
                "id": "rev-1",
                "user": {"name": "Айгерим"},
                "rating": 5,
                "text": "Очень вкусно!",
                "date_created": "2025-07-10T10:30:00Z",
                "date_edited": null,
                "is_verified": true,
                "likes_count": 3,
                "comments_count": 1
            }"#,
        );
        let review = normalize_review(&raw, "700042", "Центральный").expect("kept");
        assert_eq!(review.review_id, "rev-1");
        assert_eq!(review.user_name, "Айгерим");
        assert_eq!(review.rating, Some(5));
        assert_eq!(
            review.date_created,
            Some(Utc.with_ymd_and_hms(2025, 7, 10, 10, 30, 0).unwrap())
        );
        assert!(review.is_verified);
        assert_eq!(review.branch_id, "700042");
        assert_eq!(review.branch_name, "Центральный");
    }

    #[test]
    fn drops_record_without_id() {
        let raw = raw_from_json(r#"{"text": "orphan", "rating": 4}"#);
        assert!(normalize_review(&raw, "1", "x").is_none());
        let blank = raw_from_json(r#"{"id": "  ", "text": "blank id"}"#);
        assert!(normalize_review(&blank, "1", "x").is_none());
    }

    #[test]
    fn missing_user_name_becomes_anonymous() {
        let raw = raw_from_json(r#"{"id": "r", "user": {}}"#);
        let review = normalize_review(&raw, "1", "x").unwrap();
        assert_eq!(review.user_name, ANONYMOUS_AUTHOR);

        let empty = raw_from_json(r#"{"id": "r", "user": {"name": "  "}}"#);
        assert_eq!(
            normalize_review(&empty, "1", "x").unwrap().user_name,
            ANONYMOUS_AUTHOR
        );
    }

    #[test]
    fn null_rating_is_preserved() {
        let raw = raw_from_json(r#"{"id": "r", "rating": null}"#);
        assert_eq!(normalize_review(&raw, "1", "x").unwrap().rating, None);
    }

    #[test]
    fn parses_legacy_date_format_as_utc() {
        let parsed = parse_upstream_date("2024-03-01 12:00:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap());
        assert!(parse_upstream_date("not a date").is_none());
    }

    #[test]
    fn photo_prefers_largest_dimension() {
        let raw = raw_from_json(
            r#"{
                "id": "r",
                "photos": [
                    {"preview_urls": {"320x": "https://img/a_320.jpg",
                                       "1920x": "https://img/a_1920.jpg",
                                       "url": "https://img/a.jpg"}},
                    {"preview_urls": {"url": "https://img/b.jpg"}},
                    {"preview_urls": {}}
                ]
            }"#,
        );
        let review = normalize_review(&raw, "1", "x").unwrap();
        assert_eq!(
            review.photos_urls,
            vec!["https://img/a_1920.jpg", "https://img/b.jpg"]
        );
        assert_eq!(review.photos_count(), 2);
    }

    #[test]
    fn page_defaults_tolerate_sparse_meta() {
        let page: ReviewsPage = serde_json::from_str(r#"{"reviews": []}"#).unwrap();
        assert_eq!(page.meta.total_count, 0);
        assert!(page.reviews.is_empty());
    }
}
