//! Channel routes: publish, live subscription with gap recovery, history
//!
//! Subscriptions are Server-Sent Events. A reconnecting client sends the id
//! of the last frame it saw in the `Last-Event-ID` header and gets every
//! logged message strictly after it, in id order, before live traffic.

use std::convert::Infallible;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::api::server::AppState;
use crate::api::types::{ApiError, parse_json_body};
use crate::core::constants::{
    CHANNEL_HISTORY_DEFAULT_LIMIT, GLOBAL_HISTORY_DEFAULT_LIMIT, HISTORY_MAX_LIMIT, RESUME_HEADER,
};
use crate::data::sqlite::repositories::message;
use crate::domain::envelope::{Envelope, PublishRequest};
use crate::domain::registry::{ALL_CHANNELS, Frame};

/// POST /ch/{ch}
pub async fn publish(
    State(state): State<AppState>,
    Path(ch): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let req: PublishRequest = parse_json_body(&body)?;
    if req.from.is_empty() {
        return Err(ApiError::bad_request("missing 'from'"));
    }
    if req.kind.is_empty() {
        return Err(ApiError::bad_request("missing 'type'"));
    }

    let env = state
        .channels
        .publish(&ch, req)
        .await
        .map_err(ApiError::from_sqlite)?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": env.id, "ts": env.ts })),
    ))
}

/// GET/HEAD /ch/{ch}
pub async fn subscribe(
    State(state): State<AppState>,
    Path(ch): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    stream_events(state, ch, method, headers).await
}

/// GET /, the all-channels stream
pub async fn subscribe_all(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    stream_events(state, ALL_CHANNELS.to_string(), method, headers).await
}

async fn stream_events(
    state: AppState,
    ch: String,
    method: Method,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    // HEAD: commit the headers, no body, no subscription
    if method == Method::HEAD {
        let mut response = StatusCode::OK.into_response();
        apply_stream_headers(response.headers_mut());
        return Ok(response);
    }

    // Attach before the replay query so nothing published in between is
    // missed. A message landing in that window can show up twice; clients
    // dedupe on id.
    let (sub_id, mut rx) = state.registry.subscribe(&ch);

    let since = headers
        .get(RESUME_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .filter(|s| !s.is_empty());

    let replay = match &since {
        Some(since) => {
            let scope = if ch == ALL_CHANNELS { None } else { Some(ch.as_str()) };
            match message::replay_messages(state.db.pool(), scope, since).await {
                Ok(messages) => messages,
                Err(e) => {
                    state.registry.unsubscribe(&ch, sub_id);
                    return Err(ApiError::from_sqlite(e));
                }
            }
        }
        None => Vec::new(),
    };

    let mut shutdown_rx = state.shutdown_rx.clone();
    let stream = async_stream::stream! {
        for env in replay {
            match serde_json::to_string(&env) {
                Ok(data) => yield Ok::<_, Infallible>(Event::default().id(&env.id).data(data)),
                Err(e) => {
                    tracing::error!(id = %env.id, error = %e, "failed to encode replay frame");
                }
            }
        }

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                frame = rx.recv() => {
                    match frame {
                        Some(Frame::Event { id, data }) => {
                            yield Ok(Event::default().id(&id).data(data));
                        }
                        Some(Frame::Keepalive) => {
                            yield Ok(Event::default().comment("keepalive"));
                        }
                        // Evicted by the registry; the client reconnects
                        None => break,
                    }
                }
            }
        }
    };

    let mut response = Sse::new(stream).into_response();
    apply_stream_headers(response.headers_mut());
    Ok(response)
}

/// Headers every stream response commits before any payload byte
///
/// The proxy-buffering-off hint is not optional: reverse proxies buffer
/// event streams into invisibility without it.
fn apply_stream_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
}

#[derive(Debug, Deserialize)]
pub struct ChannelHistoryQuery {
    pub since: Option<String>,
    pub n: Option<u32>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// GET /ch/{ch}/history: newline-delimited JSON, chronological
pub async fn channel_history(
    State(state): State<AppState>,
    Path(ch): Path<String>,
    Query(query): Query<ChannelHistoryQuery>,
) -> Result<Response, ApiError> {
    let limit = query
        .n
        .unwrap_or(CHANNEL_HISTORY_DEFAULT_LIMIT)
        .min(HISTORY_MAX_LIMIT);

    let mut messages = message::list_channel_messages(
        state.db.pool(),
        &ch,
        query.since.as_deref(),
        query.kind.as_deref(),
        limit,
    )
    .await
    .map_err(ApiError::from_sqlite)?;
    messages.reverse();

    Ok(ndjson(&messages))
}

#[derive(Debug, Deserialize)]
pub struct GlobalHistoryQuery {
    pub n: Option<u32>,
}

/// GET /history: recent messages across all channels
pub async fn global_history(
    State(state): State<AppState>,
    Query(query): Query<GlobalHistoryQuery>,
) -> Result<Response, ApiError> {
    let limit = query
        .n
        .unwrap_or(GLOBAL_HISTORY_DEFAULT_LIMIT)
        .min(HISTORY_MAX_LIMIT);

    let mut messages = message::list_all_messages(state.db.pool(), limit)
        .await
        .map_err(ApiError::from_sqlite)?;
    messages.reverse();

    Ok(ndjson(&messages))
}

/// GET /channels
pub async fn list_channels(
    State(state): State<AppState>,
) -> Result<Json<Vec<String>>, ApiError> {
    let channels = message::list_channels(state.db.pool())
        .await
        .map_err(ApiError::from_sqlite)?;
    Ok(Json(channels))
}

fn ndjson(messages: &[Envelope]) -> Response {
    let mut out = String::new();
    for env in messages {
        match serde_json::to_string(env) {
            Ok(line) => {
                out.push_str(&line);
                out.push('\n');
            }
            Err(e) => tracing::error!(id = %env.id, error = %e, "failed to encode history line"),
        }
    }

    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        out,
    )
        .into_response()
}
