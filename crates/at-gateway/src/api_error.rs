//! Maps the shared [`ErrorKind`](at_core::error::ErrorKind) taxonomy onto
//! the REST error envelope from SPEC_FULL.md §6:
//! `{type: "error", error: {code, message, details?, timestamp}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use at_core::error::ErrorKind;
use serde_json::json;

pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), details: None }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    fn status(&self) -> StatusCode {
        match self.kind {
            ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::RetryableTransient | ErrorKind::SystemUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::CursorExpired => StatusCode::GONE,
            ErrorKind::CommandFailed | ErrorKind::ParseError => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "type": "error",
            "error": {
                "code": self.kind.code(),
                "message": self.message,
                "details": self.details,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));
        (self.status(), body).into_response()
    }
}

/// Wrap a successful payload in the `{type, data, requestId}` envelope.
pub fn ok_envelope(data: impl serde::Serialize, request_id: &str) -> Json<serde_json::Value> {
    Json(json!({
        "type": "ok",
        "data": data,
        "requestId": request_id,
    }))
}

impl From<at_dcg::DcgError> for ApiError {
    fn from(e: at_dcg::DcgError) -> Self {
        ApiError::new(e.kind(), e.to_string())
    }
}

impl From<at_caam::CaamError> for ApiError {
    fn from(e: at_caam::CaamError) -> Self {
        ApiError::new(e.kind(), e.to_string())
    }
}

impl From<at_gitsync::GitSyncError> for ApiError {
    fn from(e: at_gitsync::GitSyncError) -> Self {
        ApiError::new(e.kind(), e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let err = ApiError::new(ErrorKind::NotFound, "profile missing");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn conflict_maps_to_409() {
        let err = ApiError::new(ErrorKind::Conflict, "already terminal");
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn dcg_error_converts_with_matching_kind() {
        let err: ApiError = at_dcg::DcgError::UnknownPack("x".into()).into();
        assert_eq!(err.kind, ErrorKind::ValidationError);
    }
}
