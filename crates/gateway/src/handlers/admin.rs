//! Operator endpoints

use axum::{
    body::Bytes,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap},
    Json,
};
use chrono::Utc;
use gptlens_common::{
    auth::{extract_bearer, Viewer, ADMIN_SCOPE},
    errors::{AppError, Result},
    hashing::secret_matches,
    services::CleanupReport,
};
use serde::Deserialize;

use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CleanupRequest {
    #[serde(default)]
    pub dry_run: bool,
}

/// Accept the configured admin secret or a session JWT with the admin scope
fn authorize_admin(state: &AppState, headers: &HeaderMap) -> Result<()> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer)
        .ok_or_else(|| AppError::Unauthorized {
            message: "Missing bearer token".to_string(),
        })?;

    let secret = state.config.auth.admin_secret.as_deref().filter(|s| !s.is_empty());
    if secret.is_some_and(|secret| secret_matches(token, secret)) {
        return Ok(());
    }

    let viewer = Viewer::from_claims(state.jwt.validate_token(token)?)?;
    if viewer.has_scope(ADMIN_SCOPE) {
        Ok(())
    } else {
        Err(AppError::Forbidden {
            message: format!("Missing required scope: {}", ADMIN_SCOPE),
        })
    }
}

/// POST /v1/admin/cleanup
pub async fn run_cleanup(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CleanupReport>> {
    authorize_admin(&state, &headers)?;

    let request: CleanupRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CleanupRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::invalid_field("dry_run", e.to_string()))?
    };

    tracing::info!(dry_run = request.dry_run, "Cleanup triggered over HTTP");
    let report = state.cleanup.run(request.dry_run, Utc::now()).await?;
    Ok(Json(report))
}
