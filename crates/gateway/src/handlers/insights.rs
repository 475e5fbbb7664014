//! Dashboard report handlers
//!
//! All routes live under `/v1/apps/{id}` and need a session JWT.

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use chrono::Utc;
use gptlens_common::{
    analytics::{
        BenchmarkReport, ConversationMetrics, EventSummary, FunnelReport, PromptPattern,
        RetentionReport, RevenueReport, SourceBreakdown, UsagePatterns,
    },
    auth::Viewer,
    errors::{AppError, Result},
    services::{
        insights::{FeatureTable, Items},
        RangeQuery, WindowedReport,
    },
};
use uuid::Uuid;

use crate::AppState;

type Report<T> = Result<Json<WindowedReport<T>>>;

fn app_id(path: std::result::Result<Path<String>, PathRejection>) -> Result<Uuid> {
    let Path(raw) = path.map_err(|e| AppError::invalid_field("id", e.body_text()))?;
    Uuid::parse_str(&raw).map_err(|_| AppError::invalid_field("id", "id must be a UUID"))
}

fn range(query: std::result::Result<Query<RangeQuery>, QueryRejection>) -> Result<RangeQuery> {
    query
        .map(|Query(q)| q)
        .map_err(|e| AppError::invalid_field("query", e.body_text()))
}

/// GET /v1/apps/{id}/summary
pub async fn summary(
    State(state): State<AppState>,
    viewer: Viewer,
    path: std::result::Result<Path<String>, PathRejection>,
    query: std::result::Result<Query<RangeQuery>, QueryRejection>,
) -> Report<EventSummary> {
    let report = state
        .insights
        .summary(&viewer, app_id(path)?, &range(query)?, Utc::now())
        .await?;
    Ok(Json(report))
}

/// GET /v1/apps/{id}/conversations
pub async fn conversations(
    State(state): State<AppState>,
    viewer: Viewer,
    path: std::result::Result<Path<String>, PathRejection>,
    query: std::result::Result<Query<RangeQuery>, QueryRejection>,
) -> Report<ConversationMetrics> {
    let report = state
        .insights
        .conversations(&viewer, app_id(path)?, &range(query)?, Utc::now())
        .await?;
    Ok(Json(report))
}

/// GET /v1/apps/{id}/usage
pub async fn usage(
    State(state): State<AppState>,
    viewer: Viewer,
    path: std::result::Result<Path<String>, PathRejection>,
    query: std::result::Result<Query<RangeQuery>, QueryRejection>,
) -> Report<UsagePatterns> {
    let report = state
        .insights
        .usage(&viewer, app_id(path)?, &range(query)?, Utc::now())
        .await?;
    Ok(Json(report))
}

/// GET /v1/apps/{id}/retention
pub async fn retention(
    State(state): State<AppState>,
    viewer: Viewer,
    path: std::result::Result<Path<String>, PathRejection>,
    query: std::result::Result<Query<RangeQuery>, QueryRejection>,
) -> Report<RetentionReport> {
    let report = state
        .insights
        .retention(&viewer, app_id(path)?, &range(query)?, Utc::now())
        .await?;
    Ok(Json(report))
}

/// GET /v1/apps/{id}/prompts
pub async fn prompts(
    State(state): State<AppState>,
    viewer: Viewer,
    path: std::result::Result<Path<String>, PathRejection>,
    query: std::result::Result<Query<RangeQuery>, QueryRejection>,
) -> Report<Items<PromptPattern>> {
    let report = state
        .insights
        .prompts(&viewer, app_id(path)?, &range(query)?, Utc::now())
        .await?;
    Ok(Json(report))
}

/// GET /v1/apps/{id}/funnel
pub async fn funnel(
    State(state): State<AppState>,
    viewer: Viewer,
    path: std::result::Result<Path<String>, PathRejection>,
    query: std::result::Result<Query<RangeQuery>, QueryRejection>,
) -> Report<FunnelReport> {
    let report = state
        .insights
        .funnel(&viewer, app_id(path)?, &range(query)?, Utc::now())
        .await?;
    Ok(Json(report))
}

/// GET /v1/apps/{id}/revenue
pub async fn revenue(
    State(state): State<AppState>,
    viewer: Viewer,
    path: std::result::Result<Path<String>, PathRejection>,
    query: std::result::Result<Query<RangeQuery>, QueryRejection>,
) -> Report<RevenueReport> {
    let report = state
        .insights
        .revenue(&viewer, app_id(path)?, &range(query)?, Utc::now())
        .await?;
    Ok(Json(report))
}

/// GET /v1/apps/{id}/sources
pub async fn sources(
    State(state): State<AppState>,
    viewer: Viewer,
    path: std::result::Result<Path<String>, PathRejection>,
    query: std::result::Result<Query<RangeQuery>, QueryRejection>,
) -> Report<Items<SourceBreakdown>> {
    let report = state
        .insights
        .sources(&viewer, app_id(path)?, &range(query)?, Utc::now())
        .await?;
    Ok(Json(report))
}

/// GET /v1/apps/{id}/benchmarks
pub async fn benchmarks(
    State(state): State<AppState>,
    viewer: Viewer,
    path: std::result::Result<Path<String>, PathRejection>,
    query: std::result::Result<Query<RangeQuery>, QueryRejection>,
) -> Report<BenchmarkReport> {
    let report = state
        .insights
        .benchmarks(&viewer, app_id(path)?, &range(query)?, Utc::now())
        .await?;
    Ok(Json(report))
}

/// GET /v1/apps/{id}/features
pub async fn features(
    State(state): State<AppState>,
    viewer: Viewer,
    path: std::result::Result<Path<String>, PathRejection>,
) -> Result<Json<FeatureTable>> {
    let table = state.insights.features(&viewer, app_id(path)?).await?;
    Ok(Json(table))
}
