use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Codes carried in the `code` field of every error body.
///
/// These are part of the wire contract. Message text is free to change.
pub mod error_code {
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const CONFLICT: &str = "CONFLICT";
    pub const INVALID_STATE: &str = "INVALID_STATE";
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
    pub const INTERNAL: &str = "INTERNAL";
}

/// Error returned by every ledger operation and rendered by the HTTP layer as
///
/// ```json
/// {"code": "CONFLICT", "message": "instance 'bit-7' is already fitted to 'm2'", "retryable": true}
/// ```
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Unknown installation, asset, component or record. HTTP 404.
    #[error("{0}")]
    NotFound(String),

    /// The write collides with current state, e.g. a component that is
    /// already active on another asset. HTTP 409.
    #[error("{0}")]
    Conflict(String),

    /// Operation not legal in the record's current lifecycle state. HTTP 422.
    #[error("{0}")]
    InvalidState(String),

    /// Malformed request: negative reading, unknown enum, missing field. HTTP 400.
    #[error("{0}")]
    Validation(String),

    /// SQLite failure other than a constraint the ledger maps itself. HTTP 500.
    #[error("{0}")]
    Storage(String),

    /// Broken invariant or undecodable stored record. HTTP 500.
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    fn wire(&self) -> (&'static str, StatusCode) {
        use error_code::*;
        match self {
            Self::NotFound(_) => (NOT_FOUND, StatusCode::NOT_FOUND),
            Self::Conflict(_) => (CONFLICT, StatusCode::CONFLICT),
            Self::InvalidState(_) => (INVALID_STATE, StatusCode::UNPROCESSABLE_ENTITY),
            Self::Validation(_) => (VALIDATION_FAILED, StatusCode::BAD_REQUEST),
            Self::Storage(_) => (STORAGE_ERROR, StatusCode::INTERNAL_SERVER_ERROR),
            Self::Internal(_) => (INTERNAL, StatusCode::INTERNAL_SERVER_ERROR),
        }
    }

    pub fn error_code(&self) -> &'static str {
        self.wire().0
    }

    pub fn status_code(&self) -> StatusCode {
        self.wire().1
    }

    /// Conflicts and missing records may come from a concurrent writer, so
    /// re-reading and retrying can succeed. Anything else fails again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_) | Self::NotFound(_))
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (code, status) = self.wire();
        let body = axum::Json(serde_json::json!({
            "code": code,
            "message": self.to_string(),
            "retryable": self.is_retryable(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_mapping() {
        let cases = [
            (ServiceError::NotFound("installation i9".into()), "NOT_FOUND", 404, true),
            (ServiceError::Conflict("bit T active on M".into()), "CONFLICT", 409, true),
            (ServiceError::InvalidState("installation COMPLETED".into()), "INVALID_STATE", 422, false),
            (ServiceError::Validation("negative meter".into()), "VALIDATION_FAILED", 400, false),
            (ServiceError::Storage("disk I/O error".into()), "STORAGE_ERROR", 500, false),
            (ServiceError::Internal("bad row".into()), "INTERNAL", 500, false),
        ];
        for (err, code, status, retryable) in cases {
            assert_eq!(err.error_code(), code, "{err:?}");
            assert_eq!(err.status_code().as_u16(), status, "{err:?}");
            assert_eq!(err.is_retryable(), retryable, "{err:?}");
        }
    }

    #[test]
    fn display_is_the_bare_message() {
        let err = ServiceError::Validation("cycle must be positive".into());
        assert_eq!(err.to_string(), "cycle must be positive");
    }

    #[tokio::test]
    async fn response_body_carries_code_and_hint() {
        let resp = ServiceError::Conflict("asset-day m1/2024-05-01 already recorded".into())
            .into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "CONFLICT");
        assert_eq!(body["retryable"], true);
        assert_eq!(body["message"], "asset-day m1/2024-05-01 already recorded");
    }
}
