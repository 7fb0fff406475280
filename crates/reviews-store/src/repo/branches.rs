//! Branch rows. Created and updated only by the registry synchronizer;
//! never deleted.

use chrono::{DateTime, Utc};
use reviews_core::models::RosterBranch;
use sqlx::{PgPool, Row};

#[derive(Debug, Clone, serde::Serialize)]
pub struct BranchRow {
    pub branch_id: String,
    pub branch_name: String,
    pub city: Option<String>,
    pub address: Option<String>,
    pub id_steady: Option<String>,
    pub id_iiko: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BranchRow {
    fn from_row(row: &sqlx::postgres::PgRow) -> Self {
        Self {
            branch_id: row.get("branch_id"),
            branch_name: row.get("branch_name"),
            city: row.get("city"),
            address: row.get("address"),
            id_steady: row.get("id_steady"),
            id_iiko: row.get("id_iiko"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

/// Branch plus review aggregates, for the branches listing.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BranchSummary {
    pub branch_id: String,
    pub branch_name: String,
    pub city: Option<String>,
    pub address: Option<String>,
    pub total_reviews: i64,
    pub average_rating: f64,
}

pub async fn get_branch(pool: &PgPool, branch_id: &str) -> Result<Option<BranchRow>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM branches WHERE branch_id = $1")
        .bind(branch_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.as_ref().map(BranchRow::from_row))
}

pub async fn list_all(pool: &PgPool) -> Result<Vec<BranchRow>, sqlx::Error> {
    let rows = sqlx::query("SELECT * FROM branches ORDER BY branch_name")
        .fetch_all(pool)
        .await?;
    Ok(rows.iter().map(BranchRow::from_row).collect())
}

pub async fn count_branches(pool: &PgPool) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("SELECT COUNT(*) AS n FROM branches")
        .fetch_one(pool)
        .await?;
    Ok(row.get("n"))
}

pub async fn insert_branch(pool: &PgPool, branch: &RosterBranch) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO branches (branch_id, branch_name, id_steady, id_iiko)
           VALUES ($1, $2, $3, $4)
           ON CONFLICT (branch_id) DO NOTHING"#,
    )
    .bind(&branch.branch_id)
    .bind(&branch.name)
    .bind(&branch.id_steady)
    .bind(&branch.id_iiko)
    .execute(pool)
    .await?;
    Ok(())
}

/// Refresh the display fields from the roster. Touches `updated_at` only
/// when something actually changed; returns whether it did.
pub async fn update_display_fields(
    pool: &PgPool,
    branch: &RosterBranch,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"UPDATE branches
           SET branch_name = $2, id_steady = $3, id_iiko = $4, updated_at = now()
           WHERE branch_id = $1
             AND (branch_name IS DISTINCT FROM $2
                  OR id_steady IS DISTINCT FROM $3
                  OR id_iiko IS DISTINCT FROM $4)"#,
    )
    .bind(&branch.branch_id)
    .bind(&branch.name)
    .bind(&branch.id_steady)
    .bind(&branch.id_iiko)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Branches with their review count and mean rating (unrated reviews
/// excluded from the mean), optionally filtered by city substring.
pub async fn list_with_stats(
    pool: &PgPool,
    city: Option<&str>,
    skip: i64,
    limit: i64,
) -> Result<Vec<BranchSummary>, sqlx::Error> {
    let rows = match city {
        Some(city) => {
            sqlx::query(
                r#"SELECT b.branch_id, b.branch_name, b.city, b.address,
                          COUNT(r.id) AS total_reviews,
                          COALESCE(AVG(r.rating), 0)::float8 AS average_rating
                   FROM branches b
                   LEFT JOIN reviews r ON r.branch_id = b.branch_id
                   WHERE b.city ILIKE $1
                   GROUP BY b.branch_id, b.branch_name, b.city, b.address
                   ORDER BY b.branch_name
                   OFFSET $2 LIMIT $3"#,
            )
            .bind(format!("%{city}%"))
            .bind(skip)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query(
                r#"SELECT b.branch_id, b.branch_name, b.city, b.address,
                          COUNT(r.id) AS total_reviews,
                          COALESCE(AVG(r.rating), 0)::float8 AS average_rating
                   FROM branches b
                   LEFT JOIN reviews r ON r.branch_id = b.branch_id
                   GROUP BY b.branch_id, b.branch_name, b.city, b.address
                   ORDER BY b.branch_name
                   OFFSET $1 LIMIT $2"#,
            )
            .bind(skip)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
    };

    Ok(rows
        .into_iter()
        .map(|r| BranchSummary {
            branch_id: r.get("branch_id"),
            branch_name: r.get("branch_name"),
            city: r.get("city"),
            address: r.get("address"),
            total_reviews: r.get("total_reviews"),
            average_rating: {
                let avg: f64 = r.get("average_rating");
                (avg * 100.0).round() / 100.0
            },
        })
        .collect())
}
