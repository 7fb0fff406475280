use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
}

pub(crate) fn json_error(
    status: StatusCode,
    code: impl Into<String>,
    message: impl Into<String>,
) -> Response {
    (
        status,
        Json(ErrorEnvelope {
            code: code.into(),
            message: message.into(),
        }),
    )
        .into_response()
}

pub fn internal_error(err: impl Display) -> Response {
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        err.to_string(),
    )
}

pub fn bad_request(message: impl Into<String>) -> Response {
    json_error(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
}

pub fn not_found(message: impl Into<String>) -> Response {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", message)
}

pub fn service_unavailable(message: impl Into<String>) -> Response {
    json_error(StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn error_envelope_carries_code_and_message() {
        let response = bad_request("count must be between 1 and 1000");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body readable");
        let parsed: ErrorEnvelope = serde_json::from_slice(&body).expect("valid error json");
        assert_eq!(parsed.code, "BAD_REQUEST");
        assert_eq!(parsed.message, "count must be between 1 and 1000");
    }

    #[tokio::test]
    async fn not_found_and_unavailable_statuses() {
        assert_eq!(
            not_found("branch not found").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            service_unavailable("db down").status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            internal_error("boom").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
