//! Task shape and retry policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Telegram albums carry at most ten photos; anything longer is truncated
/// at task construction.
pub const MAX_ALBUM_PHOTOS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Normal,
    High,
}

impl Priority {
    /// Total delivery attempts before a task is dropped.
    pub fn max_attempts(self) -> u32 {
        match self {
            Self::Normal => 3,
            Self::High => 5,
        }
    }

    /// Backoff after a failed attempt (`attempt` is 1-based). Normal tasks
    /// wait a flat minute; high-priority tasks back off exponentially.
    pub fn retry_delay(self, attempt: u32) -> Duration {
        match self {
            Self::Normal => Duration::from_secs(60),
            Self::High => Duration::from_secs(60 * 2u64.pow(attempt.saturating_sub(1).min(16))),
        }
    }
}

/// One queued chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationTask {
    pub chat_id: i64,
    pub text: String,
    /// 0..=10 absolute photo URLs.
    #[serde(default)]
    pub photos: Vec<String>,
    pub priority: Priority,
    /// Delivery attempts already made.
    #[serde(default)]
    pub attempt: u32,
}

impl NotificationTask {
    pub fn new(chat_id: i64, text: String, mut photos: Vec<String>, priority: Priority) -> Self {
        photos.truncate(MAX_ALBUM_PHOTOS);
        Self {
            chat_id,
            text,
            photos,
            priority,
            attempt: 0,
        }
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.attempt >= self.priority.max_attempts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn photos_are_truncated_to_album_limit() {
        let photos: Vec<String> = (0..14).map(|i| format!("https://img/{i}.jpg")).collect();
        let task = NotificationTask::new(1, "text".into(), photos, Priority::Normal);
        assert_eq!(task.photos.len(), 10);
        assert_eq!(task.photos[9], "https://img/9.jpg");
    }

    #[test]
    fn normal_retry_is_linear() {
        assert_eq!(Priority::Normal.retry_delay(1), Duration::from_secs(60));
        assert_eq!(Priority::Normal.retry_delay(3), Duration::from_secs(60));
        assert_eq!(Priority::Normal.max_attempts(), 3);
    }

    #[test]
    fn high_priority_retry_is_exponential() {
        assert_eq!(Priority::High.retry_delay(1), Duration::from_secs(60));
        assert_eq!(Priority::High.retry_delay(2), Duration::from_secs(120));
        assert_eq!(Priority::High.retry_delay(3), Duration::from_secs(240));
        assert_eq!(Priority::High.max_attempts(), 5);
    }

    #[test]
    fn exhaustion_tracks_priority_budget() {
        let mut task = NotificationTask::new(1, "t".into(), vec![], Priority::Normal);
        task.attempt = 2;
        assert!(!task.attempts_exhausted());
        task.attempt = 3;
        assert!(task.attempts_exhausted());
    }

    #[test]
    fn task_round_trips_through_json() {
        let task = NotificationTask::new(
            42,
            "body".into(),
            vec!["https://img/a.jpg".into()],
            Priority::High,
        );
        let json = serde_json::to_string(&task).unwrap();
        let back: NotificationTask = serde_json::from_str(&json).unwrap();
        assert_eq!(back, task);
    }
}
