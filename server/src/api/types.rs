//! Shared API types
//!
//! `ApiError` is the one typed failure handlers raise; rendering happens in
//! exactly one place (`IntoResponse`) and always produces `{"error": <msg>}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::de::DeserializeOwned;

use crate::data::files::BlobStoreError;
use crate::data::sqlite::SqliteError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Forbidden(String),
    Conflict(String),
    PayloadTooLarge(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::PayloadTooLarge(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn from_sqlite(e: SqliteError) -> Self {
        tracing::error!(error = %e, "SQLite error");
        Self::Internal("database operation failed".to_string())
    }

    pub fn from_blob(e: BlobStoreError) -> Self {
        match e {
            BlobStoreError::NotFound { .. } => Self::NotFound("file not found".to_string()),
            BlobStoreError::InvalidDigest(_) => {
                Self::BadRequest("invalid hash format".to_string())
            }
            BlobStoreError::Io(e) => {
                tracing::error!(error = %e, "blob store error");
                Self::Internal("file operation failed".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m),
            Self::Forbidden(m) => (StatusCode::FORBIDDEN, m),
            Self::Conflict(m) => (StatusCode::CONFLICT, m),
            Self::PayloadTooLarge(m) => (StatusCode::PAYLOAD_TOO_LARGE, m),
            Self::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Decode a JSON request body
///
/// Any parse failure is a 400 with the explicit "invalid JSON body" message,
/// never a missing-field error.
pub fn parse_json_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|_| ApiError::bad_request("invalid JSON body"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::envelope::PublishRequest;

    #[tokio::test]
    async fn test_error_renders_single_field_body() {
        let response = ApiError::conflict("lost claim race").into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({"error": "lost claim race"}));
    }

    #[test]
    fn test_parse_json_body_reports_invalid_json() {
        let err = parse_json_body::<PublishRequest>(b"{invalid").unwrap_err();
        match err {
            ApiError::BadRequest(m) => assert_eq!(m, "invalid JSON body"),
            other => panic!("expected BadRequest, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_json_body_accepts_valid() {
        let req: PublishRequest = parse_json_body(br#"{"from":"u","type":"t"}"#).unwrap();
        assert_eq!(req.from, "u");
    }

    #[test]
    fn test_blob_error_mapping() {
        let not_found = ApiError::from_blob(BlobStoreError::NotFound {
            digest: "sha256:x".to_string(),
        });
        assert!(matches!(not_found, ApiError::NotFound(_)));

        let invalid = ApiError::from_blob(BlobStoreError::InvalidDigest("bad".to_string()));
        match invalid {
            ApiError::BadRequest(m) => assert_eq!(m, "invalid hash format"),
            other => panic!("expected BadRequest, got {:?}", other),
        }
    }
}
