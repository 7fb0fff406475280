//! Persisted conversational state, one JSON blob per Telegram user.
//! Last-writer-wins; a periodic sweep removes entries older than one hour.

use sqlx::{PgPool, Row};

pub async fn get_state(
    pool: &PgPool,
    user_id: &str,
) -> Result<Option<serde_json::Value>, sqlx::Error> {
    let row = sqlx::query("SELECT state_data FROM telegram_user_states WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.get("state_data")))
}

pub async fn save_state(
    pool: &PgPool,
    user_id: &str,
    state: &serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO telegram_user_states (user_id, state_data)
           VALUES ($1, $2)
           ON CONFLICT (user_id) DO UPDATE
               SET state_data = EXCLUDED.state_data, updated_at = now()"#,
    )
    .bind(user_id)
    .bind(state)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn clear_state(pool: &PgPool, user_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM telegram_user_states WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Remove states untouched for more than `max_age_secs`. Returns the
/// number of rows harvested.
pub async fn delete_older_than(pool: &PgPool, max_age_secs: i32) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM telegram_user_states WHERE updated_at < now() - make_interval(secs => $1)",
    )
    .bind(f64::from(max_age_secs))
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
