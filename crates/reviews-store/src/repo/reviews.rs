//! Review persistence and queries.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use reviews_core::NewReview;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use super::{month_keys, ReviewRow};

/// Insert every review whose `review_id` is not already present; existing
/// rows are left untouched. Returns the number actually inserted. Safe
/// under concurrent writers: the unique index arbitrates, a conflict is a
/// silent no-op.
pub async fn insert_ignoring_duplicates(
    pool: &PgPool,
    reviews: &[NewReview],
) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut inserted = 0u64;
    for review in reviews {
        let result = sqlx::query(
            r#"INSERT INTO reviews
                   (review_id, branch_id, branch_name, user_name, rating, text,
                    date_created, date_edited, is_verified, likes_count,
                    comments_count, photos_count, photos_urls)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
               ON CONFLICT (review_id) DO NOTHING"#,
        )
        .bind(&review.review_id)
        .bind(&review.branch_id)
        .bind(&review.branch_name)
        .bind(&review.user_name)
        .bind(review.rating)
        .bind(&review.text)
        .bind(review.date_created)
        .bind(review.date_edited)
        .bind(review.is_verified)
        .bind(review.likes_count)
        .bind(review.comments_count)
        .bind(review.photos_count())
        .bind(serde_json::json!(review.photos_urls))
        .execute(&mut *tx)
        .await?;
        inserted += result.rows_affected();
    }
    tx.commit().await?;
    Ok(inserted)
}

/// Every `review_id` already stored for a branch; the scheduler prunes
/// upstream pages against this set.
pub async fn list_existing_review_ids(
    pool: &PgPool,
    branch_id: &str,
) -> Result<HashSet<String>, sqlx::Error> {
    let rows = sqlx::query("SELECT review_id FROM reviews WHERE branch_id = $1")
        .bind(branch_id)
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(|r| r.get("review_id")).collect())
}

/// Newest `date_created` for a branch. Informational only.
pub async fn latest_review_timestamp(
    pool: &PgPool,
    branch_id: &str,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    let row = sqlx::query("SELECT MAX(date_created) AS latest FROM reviews WHERE branch_id = $1")
        .bind(branch_id)
        .fetch_one(pool)
        .await?;
    Ok(row.get("latest"))
}

/// Reviews not yet fanned out to Telegram, newest first.
pub async fn list_unnotified(pool: &PgPool, limit: i64) -> Result<Vec<ReviewRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT * FROM reviews
           WHERE NOT sent_to_telegram
           ORDER BY date_created DESC NULLS LAST
           LIMIT $1"#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(ReviewRow::from_row).collect())
}

/// Flip `sent_to_telegram`. Returns whether this call claimed the flip;
/// a second (concurrent or repeated) call is a no-op and returns false.
pub async fn claim_notified(pool: &PgPool, review_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE reviews SET sent_to_telegram = TRUE, updated_at = now()
         WHERE review_id = $1 AND NOT sent_to_telegram",
    )
    .bind(review_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn get_by_review_id(
    pool: &PgPool,
    review_id: &str,
) -> Result<Option<ReviewRow>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM reviews WHERE review_id = $1")
        .bind(review_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(ReviewRow::from_row))
}

/// The `count` newest reviews of one branch.
pub async fn latest_for_branch(
    pool: &PgPool,
    branch_id: &str,
    count: i64,
) -> Result<Vec<ReviewRow>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT * FROM reviews WHERE branch_id = $1 ORDER BY date_created DESC LIMIT $2",
    )
    .bind(branch_id)
    .bind(count)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(ReviewRow::from_row).collect())
}

/// Reviews of one branch inside `[from, to]`, newest first, paginated.
/// Fetches `limit + 1` rows so the caller can tell whether more remain.
pub async fn list_for_period(
    pool: &PgPool,
    branch_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    offset: i64,
    limit: i64,
) -> Result<Vec<ReviewRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT * FROM reviews
           WHERE branch_id = $1 AND date_created >= $2 AND date_created <= $3
           ORDER BY date_created DESC
           OFFSET $4 LIMIT $5"#,
    )
    .bind(branch_id)
    .bind(from)
    .bind(to)
    .bind(offset)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(ReviewRow::from_row).collect())
}

/// Sort keys accepted by the filtered listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    DateCreated,
    Rating,
    LikesCount,
}

impl SortBy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "date_created" => Some(Self::DateCreated),
            "rating" => Some(Self::Rating),
            "likes_count" => Some(Self::LikesCount),
            _ => None,
        }
    }

    fn column(self) -> &'static str {
        match self {
            Self::DateCreated => "date_created",
            Self::Rating => "rating",
            Self::LikesCount => "likes_count",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReviewFilter {
    pub branch_id: Option<String>,
    pub rating: Option<i32>,
    pub verified_only: bool,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub sort_by: Option<SortBy>,
    pub descending: bool,
    pub skip: i64,
    pub limit: i64,
}

pub async fn list_filtered(
    pool: &PgPool,
    filter: &ReviewFilter,
) -> Result<Vec<ReviewRow>, sqlx::Error> {
    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT * FROM reviews WHERE TRUE");
    if let Some(branch_id) = &filter.branch_id {
        qb.push(" AND branch_id = ").push_bind(branch_id);
    }
    if let Some(rating) = filter.rating {
        qb.push(" AND rating = ").push_bind(rating);
    }
    if filter.verified_only {
        qb.push(" AND is_verified");
    }
    if let Some(from) = filter.date_from {
        qb.push(" AND date_created >= ").push_bind(from);
    }
    if let Some(to) = filter.date_to {
        qb.push(" AND date_created <= ").push_bind(to);
    }
    if let Some(search) = &filter.search {
        qb.push(" AND text ILIKE ")
            .push_bind(format!("%{search}%"));
    }
    let sort = filter.sort_by.unwrap_or(SortBy::DateCreated);
    qb.push(" ORDER BY ").push(sort.column());
    qb.push(if filter.descending { " DESC" } else { " ASC" });
    qb.push(" OFFSET ").push_bind(filter.skip);
    qb.push(" LIMIT ").push_bind(filter.limit);

    let rows = qb.build().fetch_all(pool).await?;
    Ok(rows.iter().map(ReviewRow::from_row).collect())
}

pub async fn count_reviews(pool: &PgPool) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM reviews")
        .fetch_one(pool)
        .await?;
    Ok(row.get("n"))
}

/// Per-branch aggregate. Unrated reviews count toward the total but are
/// excluded from the mean and the histogram.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BranchStats {
    pub total_reviews: i64,
    pub average_rating: f64,
    pub rating_distribution: BTreeMap<String, i64>,
    pub verified_count: i64,
    pub last_review_date: Option<DateTime<Utc>>,
}

pub async fn branch_stats(pool: &PgPool, branch_id: &str) -> Result<BranchStats, sqlx::Error> {
    let summary = sqlx::query(
        r#"SELECT COUNT(*) AS total,
                  COALESCE(AVG(rating), 0)::float8 AS average,
                  COUNT(*) FILTER (WHERE is_verified) AS verified,
                  MAX(date_created) AS last_review
           FROM reviews WHERE branch_id = $1"#,
    )
    .bind(branch_id)
    .fetch_one(pool)
    .await?;

    let histogram_rows = sqlx::query(
        r#"SELECT rating, COUNT(*) AS n FROM reviews
           WHERE branch_id = $1 AND rating BETWEEN 1 AND 5
           GROUP BY rating"#,
    )
    .bind(branch_id)
    .fetch_all(pool)
    .await?;

    Ok(BranchStats {
        total_reviews: summary.get("total"),
        average_rating: rounded(summary.get("average")),
        rating_distribution: fold_histogram(&histogram_rows),
        verified_count: summary.get("verified"),
        last_review_date: summary.get("last_review"),
    })
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct GeneralStats {
    pub total_reviews: i64,
    pub average_rating: f64,
    pub total_branches: i64,
    pub rating_distribution: BTreeMap<String, i64>,
    pub reviews_by_month: BTreeMap<String, i64>,
}

pub async fn general_stats(pool: &PgPool) -> Result<GeneralStats, sqlx::Error> {
    let summary = sqlx::query(
        r#"SELECT (SELECT COUNT(*) FROM reviews) AS total_reviews,
                  (SELECT COALESCE(AVG(rating), 0)::float8 FROM reviews) AS average,
                  (SELECT COUNT(*) FROM branches) AS total_branches"#,
    )
    .fetch_one(pool)
    .await?;

    let histogram_rows = sqlx::query(
        "SELECT rating, COUNT(*) AS n FROM reviews WHERE rating BETWEEN 1 AND 5 GROUP BY rating",
    )
    .fetch_all(pool)
    .await?;

    let month_rows = sqlx::query(
        r#"SELECT to_char(date_trunc('month', date_created), 'YYYY-MM') AS month,
                  COUNT(*) AS n
           FROM reviews
           WHERE date_created >= date_trunc('month', now()) - interval '11 months'
           GROUP BY 1"#,
    )
    .fetch_all(pool)
    .await?;
    let counted: BTreeMap<String, i64> = month_rows
        .into_iter()
        .map(|r| (r.get::<String, _>("month"), r.get::<i64, _>("n")))
        .collect();
    let reviews_by_month = month_keys(Utc::now(), 12)
        .into_iter()
        .map(|key| {
            let n = counted.get(&key).copied().unwrap_or(0);
            (key, n)
        })
        .collect();

    Ok(GeneralStats {
        total_reviews: summary.get("total_reviews"),
        average_rating: rounded(summary.get("average")),
        total_branches: summary.get("total_branches"),
        rating_distribution: fold_histogram(&histogram_rows),
        reviews_by_month,
    })
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DayActivity {
    pub count: i64,
    pub average_rating: f64,
}

/// Per-day review counts and mean rating over the last `days` days.
pub async fn recent_activity(
    pool: &PgPool,
    days: i32,
) -> Result<BTreeMap<String, DayActivity>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT to_char(date_created, 'YYYY-MM-DD') AS day,
                  COUNT(*) AS n,
                  COALESCE(AVG(rating), 0)::float8 AS average
           FROM reviews
           WHERE date_created >= now() - make_interval(days => $1)
           GROUP BY 1
           ORDER BY 1"#,
    )
    .bind(days)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .map(|r| {
            (
                r.get::<String, _>("day"),
                DayActivity {
                    count: r.get("n"),
                    average_rating: rounded(r.get("average")),
                },
            )
        })
        .collect())
}

fn fold_histogram(rows: &[sqlx::postgres::PgRow]) -> BTreeMap<String, i64> {
    let mut histogram: BTreeMap<String, i64> =
        (1..=5).map(|r| (r.to_string(), 0)).collect();
    for row in rows {
        let rating: i32 = row.get("rating");
        histogram.insert(rating.to_string(), row.get("n"));
    }
    histogram
}

fn rounded(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
