use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use promptgate_common::Error;
use tracing::{error, warn};

/// An error on its way out of a handler, already resolved to a status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn history_unavailable() -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "chat history is not enabled",
        )
    }
}

/// Status code used to surface `err` over HTTP.
pub fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::UnsupportedContext(_) => StatusCode::BAD_REQUEST,
        Error::MalformedRequest(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        Error::Upstream { .. } => err
            .upstream_status()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .filter(|s| s.is_client_error() || s.is_server_error())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Error::HistoryStoreInit(_)
        | Error::Format(_)
        | Error::Database(_)
        | Error::Config(_)
        | Error::Io(_)
        | Error::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let message = match &err {
            Error::Upstream { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self::new(status_for(&err), message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(status = self.status.as_u16(), "request failed: {}", self.message);
        } else {
            warn!(status = self.status.as_u16(), "request rejected: {}", self.message);
        }
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_taxonomy_to_status_codes() {
        assert_eq!(
            status_for(&Error::UnsupportedContext("hr".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&Error::MalformedRequest("not json".into())),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            status_for(&Error::upstream(Some(429), "slow down")),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_for(&Error::upstream(None, "connection reset")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&Error::Format("no choices".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn non_error_upstream_status_falls_back_to_500() {
        assert_eq!(
            status_for(&Error::upstream(Some(200), "odd")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_for(&Error::upstream(Some(42), "invalid")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn upstream_message_is_passed_through() {
        let api: ApiError = Error::upstream(Some(401), "Access denied due to invalid key").into();
        assert_eq!(api.status, StatusCode::UNAUTHORIZED);
        assert_eq!(api.message, "Access denied due to invalid key");
    }
}
