//! Persisted conversational state.
//!
//! Single-valued per user, last-writer-wins. An unreadable blob (schema
//! drift, manual edits) reads as "no state" and the flow restarts.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use reviews_store::repo::sessions;

/// One branch row of the subscribe checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchOption {
    pub branch_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum SessionState {
    /// Subscribe checklist: toggled selection over the roster.
    Choosing {
        selected: Vec<String>,
        available: Vec<BranchOption>,
    },
    /// Browse: waiting for the period start date.
    BrowseDateFrom {
        branch_id: String,
        branch_name: String,
    },
    /// Browse: start picked, waiting for the end date.
    BrowseDateTo {
        branch_id: String,
        branch_name: String,
        date_from: NaiveDate,
    },
    /// Browse: listing pages of five.
    BrowsePage {
        branch_id: String,
        branch_name: String,
        date_from: NaiveDate,
        date_to: NaiveDate,
        offset: i64,
    },
}

pub async fn load(pool: &PgPool, user_id: &str) -> Result<Option<SessionState>, sqlx::Error> {
    let raw = sessions::get_state(pool, user_id).await?;
    Ok(raw.and_then(|value| serde_json::from_value(value).ok()))
}

pub async fn save(
    pool: &PgPool,
    user_id: &str,
    state: &SessionState,
) -> Result<(), sqlx::Error> {
    let value = serde_json::to_value(state).unwrap_or_default();
    sessions::save_state(pool, user_id, &value).await
}

pub async fn clear(pool: &PgPool, user_id: &str) -> Result<(), sqlx::Error> {
    sessions::clear_state(pool, user_id).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_json() {
        let state = SessionState::BrowsePage {
            branch_id: "42".into(),
            branch_name: "Центральный".into(),
            date_from: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            date_to: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            offset: 10,
        };
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["step"], "browse_page");
        let back: SessionState = serde_json::from_value(value).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn unknown_step_reads_as_no_state() {
        let value = serde_json::json!({"step": "retired_flow", "foo": 1});
        let parsed: Option<SessionState> = serde_json::from_value(value).ok();
        assert!(parsed.is_none());
    }
}
