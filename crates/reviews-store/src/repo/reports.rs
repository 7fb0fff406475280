//! Append-only parse run reports.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

#[derive(Debug, Clone)]
pub struct NewParseReport {
    pub parse_date: DateTime<Utc>,
    pub total_branches: i32,
    pub successful_branches: i32,
    pub failed_branches: i32,
    pub total_reviews: i32,
    pub new_reviews: i32,
    pub duration_seconds: f64,
    /// Serialized summary of the branches that failed this run.
    pub errors: Option<String>,
}

pub async fn insert_report(pool: &PgPool, report: &NewParseReport) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO parse_reports
               (parse_date, total_branches, successful_branches, failed_branches,
                total_reviews, new_reviews, duration_seconds, errors)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
    )
    .bind(report.parse_date)
    .bind(report.total_branches)
    .bind(report.successful_branches)
    .bind(report.failed_branches)
    .bind(report.total_reviews)
    .bind(report.new_reviews)
    .bind(report.duration_seconds)
    .bind(&report.errors)
    .execute(pool)
    .await?;
    Ok(())
}
