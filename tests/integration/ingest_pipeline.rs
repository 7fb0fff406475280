//! End-to-end ingestion semantics on upstream fixtures: two-page
//! pagination, normalization, and idempotent re-ingest diffing.

use std::collections::HashSet;

use parser::scheduler::select_new;
use reviews_core::normalize::{normalize_review, ReviewsPage};
use reviews_core::NewReview;

fn page_json(first_id: usize, count: usize, total: usize) -> String {
    let reviews: Vec<String> = (first_id..first_id + count)
        .map(|i| {
            format!(
                r#"{{"id": "rev-{i}", "user": {{"name": "Гость {i}"}}, "rating": {},
                     "text": "Отзыв номер {i}", "date_created": "2025-07-{:02}T10:00:00Z",
                     "is_verified": {}, "likes_count": {i}, "comments_count": 0}}"#,
                1 + i % 5,
                1 + i % 28,
                i % 2 == 0
            )
        })
        .collect();
    format!(
        r#"{{"meta": {{"total_count": {total}}}, "reviews": [{}]}}"#,
        reviews.join(",")
    )
}

fn normalize_page(json: &str) -> Vec<NewReview> {
    let page: ReviewsPage = serde_json::from_str(json).expect("page json");
    page.reviews
        .iter()
        .filter_map(|raw| normalize_review(raw, "70001", "Центральный"))
        .collect()
}

#[test]
fn fresh_ingest_two_pages_yields_seventy_five_unique_rows() {
    // Upstream: total_count = 75, pages of 50 then 25.
    let first = normalize_page(&page_json(0, 50, 75));
    let second = normalize_page(&page_json(50, 25, 75));
    assert_eq!(first.len(), 50);
    assert_eq!(second.len(), 25);

    let all: Vec<NewReview> = first.into_iter().chain(second).collect();
    let unique: HashSet<&str> = all.iter().map(|r| r.review_id.as_str()).collect();
    assert_eq!(unique.len(), 75, "review ids must be globally unique");

    // Empty store: everything is new.
    let fresh = select_new(all, &HashSet::new());
    assert_eq!(fresh.len(), 75);
}

#[test]
fn re_ingest_of_an_unchanged_snapshot_inserts_nothing() {
    let all = normalize_page(&page_json(0, 50, 50));
    let stored: HashSet<String> = all.iter().map(|r| r.review_id.clone()).collect();

    let second_run = select_new(all, &stored);
    assert!(second_run.is_empty(), "idempotent ingest must add zero rows");
}

#[test]
fn one_new_review_in_a_known_tail_is_the_only_insert() {
    let known = normalize_page(&page_json(0, 75, 75));
    let stored: HashSet<String> = known.iter().map(|r| r.review_id.clone()).collect();

    // The upstream now reports 76 records; one id is fresh.
    let mut next_snapshot = normalize_page(&page_json(0, 75, 76));
    next_snapshot.extend(normalize_page(&page_json(75, 1, 76)));

    let fresh = select_new(next_snapshot, &stored);
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].review_id, "rev-75");
    assert!(!fresh[0].is_verified, "rev-75 is an odd index");
}

#[test]
fn records_without_ids_never_reach_the_diff() {
    let json = r#"{"meta": {"total_count": 3}, "reviews": [
        {"id": "keep-1", "rating": 5},
        {"rating": 4, "text": "без идентификатора"},
        {"id": "", "rating": 3}
    ]}"#;
    let normalized = normalize_page(json);
    assert_eq!(normalized.len(), 1);
    assert_eq!(normalized[0].review_id, "keep-1");
}
