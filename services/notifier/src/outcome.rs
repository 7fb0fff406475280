//! Classification of Telegram send failures.

use std::time::Duration;

use teloxide::{ApiError, RequestError};

/// What the worker should do with a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The recipient made the bot unreachable; terminal, never retried.
    Blocked,
    /// The platform told us exactly how long to wait; honored verbatim
    /// and does not consume the retry budget.
    RetryAfter(Duration),
    /// Anything else worth another attempt under the lane's backoff.
    Transient(String),
}

pub fn classify(error: &RequestError) -> FailureKind {
    match error {
        RequestError::Api(api) => match api {
            ApiError::BotBlocked | ApiError::UserDeactivated => FailureKind::Blocked,
            other => FailureKind::Transient(other.to_string()),
        },
        RequestError::RetryAfter(seconds) => FailureKind::RetryAfter(seconds.duration()),
        other => FailureKind::Transient(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_is_terminal() {
        assert_eq!(
            classify(&RequestError::Api(ApiError::BotBlocked)),
            FailureKind::Blocked
        );
        assert_eq!(
            classify(&RequestError::Api(ApiError::UserDeactivated)),
            FailureKind::Blocked
        );
    }

    #[test]
    fn other_api_errors_are_transient() {
        let kind = classify(&RequestError::Api(ApiError::MessageTextIsEmpty));
        assert!(matches!(kind, FailureKind::Transient(_)));
    }
}
