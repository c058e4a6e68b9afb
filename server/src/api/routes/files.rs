//! Blob routes: upload and download by digest

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::api::server::AppState;
use crate::api::types::ApiError;
use crate::core::constants::MAX_UPLOAD_BYTES;
use crate::utils::crypto::is_valid_digest;

/// POST /files
pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    // Declared length first, so oversized uploads are refused before the
    // body is read in full; the actual length is re-checked after.
    if let Some(declared) = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<usize>().ok())
        && declared > MAX_UPLOAD_BYTES
    {
        return Err(ApiError::payload_too_large("file too large"));
    }
    if body.len() > MAX_UPLOAD_BYTES {
        return Err(ApiError::payload_too_large("file too large"));
    }

    let (hash, size) = state
        .blobs
        .store(&body)
        .await
        .map_err(ApiError::from_blob)?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "hash": hash, "size": size })),
    ))
}

/// GET /files/{hash}
///
/// The digest is validated against the exact wire pattern before any
/// filesystem access; a traversal attempt never reaches the store.
pub async fn download(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Response, ApiError> {
    if !is_valid_digest(&hash) {
        return Err(ApiError::bad_request("invalid hash format"));
    }

    let data = state
        .blobs
        .read(&hash)
        .await
        .map_err(ApiError::from_blob)?;

    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        data,
    )
        .into_response())
}
