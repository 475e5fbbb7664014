//! Collector ingress handlers

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use gptlens_common::{
    auth::extract_bearer,
    errors::{AppError, Result},
    services::IngestReceipt,
};

use crate::AppState;

/// Turn an oversized or unreadable body into a structured error
fn read_body(body: std::result::Result<Bytes, BytesRejection>, limit: usize) -> Result<Bytes> {
    body.map_err(|rejection| match rejection.status() {
        StatusCode::PAYLOAD_TOO_LARGE => AppError::PayloadTooLarge {
            size: limit.saturating_add(1),
            limit,
        },
        _ => AppError::invalid_field("body", rejection.body_text()),
    })
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// POST /v1/events
pub async fn track_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<IngestReceipt>)> {
    let body = read_body(body, state.ingest.max_body_bytes())?;
    let key = header(&headers, &state.config.auth.write_key_header);

    let receipt = state.ingest.ingest(key, &body, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// POST /v1/gpt/track
///
/// GPT Actions can only send static auth headers, so the write key may also
/// arrive as a bearer token. Raw `prompt` and `user_id` fields are hashed
/// by the ingest service before anything is stored.
pub async fn track_gpt_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<(StatusCode, Json<IngestReceipt>)> {
    let body = read_body(body, state.ingest.max_body_bytes())?;
    let key = header(&headers, &state.config.auth.write_key_header)
        .or_else(|| header(&headers, AUTHORIZATION.as_str()).and_then(extract_bearer));

    let receipt = state.ingest.ingest(key, &body, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}
