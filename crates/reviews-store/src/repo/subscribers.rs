//! Telegram subscribers and their branch subscriptions.
//!
//! Subscriptions are soft-deactivated, never deleted, so that re-selecting
//! a branch reactivates the same row.

use sqlx::{PgPool, Row};

/// Display fields captured from every `/start`.
#[derive(Debug, Clone, Default)]
pub struct SubscriberProfile {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SubscriptionRow {
    pub user_id: String,
    pub branch_id: String,
    pub branch_name: String,
    pub is_active: bool,
}

impl SubscriptionRow {
    fn from_row(row: &sqlx::postgres::PgRow) -> Self {
        Self {
            user_id: row.get("user_id"),
            branch_id: row.get("branch_id"),
            branch_name: row.get("branch_name"),
            is_active: row.get("is_active"),
        }
    }
}

/// Create the subscriber or refresh the display fields.
pub async fn upsert_user(
    pool: &PgPool,
    user_id: &str,
    profile: &SubscriberProfile,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO telegram_users (user_id, username, first_name, last_name, language_code)
           VALUES ($1, $2, $3, $4, $5)
           ON CONFLICT (user_id) DO UPDATE
               SET username = EXCLUDED.username,
                   first_name = EXCLUDED.first_name,
                   last_name = EXCLUDED.last_name,
                   language_code = EXCLUDED.language_code,
                   updated_at = now()"#,
    )
    .bind(user_id)
    .bind(&profile.username)
    .bind(&profile.first_name)
    .bind(&profile.last_name)
    .bind(&profile.language_code)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn active_for_user(
    pool: &PgPool,
    user_id: &str,
) -> Result<Vec<SubscriptionRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT user_id, branch_id, branch_name, is_active
           FROM telegram_subscriptions
           WHERE user_id = $1 AND is_active
           ORDER BY branch_name"#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(SubscriptionRow::from_row).collect())
}

/// Every row for the user, active or not. The reconciliation planner needs
/// the inactive ones to reactivate instead of inserting duplicates.
pub async fn all_for_user(
    pool: &PgPool,
    user_id: &str,
) -> Result<Vec<SubscriptionRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT user_id, branch_id, branch_name, is_active
           FROM telegram_subscriptions
           WHERE user_id = $1
           ORDER BY branch_name"#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(SubscriptionRow::from_row).collect())
}

pub async fn active_for_branch(
    pool: &PgPool,
    branch_id: &str,
) -> Result<Vec<SubscriptionRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT user_id, branch_id, branch_name, is_active
           FROM telegram_subscriptions
           WHERE branch_id = $1 AND is_active"#,
    )
    .bind(branch_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(SubscriptionRow::from_row).collect())
}

/// The reconciliation delta computed by the bot's subscribe flow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionPlan {
    pub deactivate: Vec<String>,
    pub reactivate: Vec<String>,
    /// (branch_id, branch_name)
    pub insert: Vec<(String, String)>,
}

impl SubscriptionPlan {
    pub fn is_empty(&self) -> bool {
        self.deactivate.is_empty() && self.reactivate.is_empty() && self.insert.is_empty()
    }
}

/// Apply a plan atomically: after commit, the user's active set equals
/// exactly the confirmed selection.
pub async fn apply_plan(
    pool: &PgPool,
    user_id: &str,
    plan: &SubscriptionPlan,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for branch_id in &plan.deactivate {
        sqlx::query(
            "UPDATE telegram_subscriptions SET is_active = FALSE, updated_at = now()
             WHERE user_id = $1 AND branch_id = $2 AND is_active",
        )
        .bind(user_id)
        .bind(branch_id)
        .execute(&mut *tx)
        .await?;
    }
    for branch_id in &plan.reactivate {
        sqlx::query(
            "UPDATE telegram_subscriptions SET is_active = TRUE, updated_at = now()
             WHERE user_id = $1 AND branch_id = $2 AND NOT is_active",
        )
        .bind(user_id)
        .bind(branch_id)
        .execute(&mut *tx)
        .await?;
    }
    for (branch_id, branch_name) in &plan.insert {
        sqlx::query(
            "INSERT INTO telegram_subscriptions (user_id, branch_id, branch_name)
             VALUES ($1, $2, $3)",
        )
        .bind(user_id)
        .bind(branch_id)
        .bind(branch_name)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Soft-deactivate every active subscription. Returns how many flipped.
pub async fn deactivate_all(pool: &PgPool, user_id: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE telegram_subscriptions SET is_active = FALSE, updated_at = now()
         WHERE user_id = $1 AND is_active",
    )
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
