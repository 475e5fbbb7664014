//! Dashboard read service
//!
//! Each report authorizes the viewer against the app's org, fetches the
//! window once and hands it to a pure reducer from `analytics`.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::analytics::{self, prompts::DEFAULT_PATTERN_LIMIT};
use crate::auth::Viewer;
use crate::config::{AnalyticsConfig, RetentionConfig};
use crate::db::models::Event;
use crate::db::{AnalyticsStore, AppProjection};
use crate::errors::{AppError, Result};
use crate::metrics::record_aggregation;
use crate::plans::{Feature, Plan};
use crate::services::cleanup::RetentionPolicy;

/// Longest window a report may cover, explicit `from`/`to` included
pub const MAX_RANGE_DAYS: i64 = 365;

/// Query string accepted by every dashboard report
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct RangeQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,

    #[validate(range(min = 1, max = 365))]
    pub days: Option<u32>,

    #[validate(range(min = 1, max = 500))]
    pub limit: Option<usize>,
}

/// Resolved half-open window `[from, to)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl ReportWindow {
    pub fn first_day(&self) -> NaiveDate {
        self.from.date_naive()
    }

    /// Last calendar day touched by the window
    pub fn last_day(&self) -> NaiveDate {
        (self.to - Duration::nanoseconds(1)).date_naive()
    }
}

impl RangeQuery {
    /// `to` defaults to `now`, `from` to `to - days`
    pub fn window(&self, now: DateTime<Utc>, default_days: u32) -> Result<ReportWindow> {
        self.validate()?;

        let to = self.to.unwrap_or(now);
        let days = self.days.unwrap_or(default_days);
        let from = self.from.unwrap_or(to - Duration::days(days as i64));

        if from >= to {
            return Err(AppError::invalid_field("from", "from must be before to"));
        }
        if to - from > Duration::days(MAX_RANGE_DAYS) {
            return Err(AppError::invalid_field(
                "from",
                format!("range must not exceed {} days", MAX_RANGE_DAYS),
            ));
        }
        Ok(ReportWindow { from, to })
    }
}

/// A report together with the app and window it covers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowedReport<T> {
    pub app_id: Uuid,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    #[serde(flatten)]
    pub report: T,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlag {
    pub feature: Feature,
    pub enabled: bool,
}

/// Plan entitlements of one app
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureTable {
    pub app_id: Uuid,
    pub plan: Plan,
    pub retention_days: u32,
    pub features: Vec<FeatureFlag>,
}

/// List wrapper so array reports still flatten into an object
#[derive(Debug, Clone, Serialize)]
pub struct Items<T> {
    pub items: Vec<T>,
}

pub struct InsightsService {
    store: Arc<dyn AnalyticsStore>,
    config: AnalyticsConfig,
    retention: RetentionPolicy,
}

impl InsightsService {
    pub fn new(
        store: Arc<dyn AnalyticsStore>,
        config: &AnalyticsConfig,
        retention: &RetentionConfig,
    ) -> Self {
        Self {
            store,
            config: config.clone(),
            retention: RetentionPolicy::from(retention),
        }
    }

    /// Resolve the app and check the viewer belongs to its org
    pub async fn authorize(&self, viewer: &Viewer, app_id: Uuid) -> Result<AppProjection> {
        let projection = self
            .store
            .find_app(app_id)
            .await?
            .ok_or_else(|| AppError::AppNotFound {
                id: app_id.to_string(),
            })?;

        let org_id = projection.app.org_id;
        if viewer.org_id.is_some_and(|claimed| claimed != org_id) {
            return Err(AppError::TenantMismatch);
        }
        if !self.store.is_org_member(org_id, viewer.user_id).await? {
            return Err(AppError::Forbidden {
                message: "Not a member of this app's organization".to_string(),
            });
        }

        Ok(projection)
    }

    async fn over_events<T, F>(
        &self,
        viewer: &Viewer,
        app_id: Uuid,
        window: ReportWindow,
        report: &'static str,
        reduce: F,
    ) -> Result<WindowedReport<T>>
    where
        F: FnOnce(&[Event]) -> T,
    {
        self.authorize(viewer, app_id).await?;
        let events = self.store.events_in_range(app_id, window.from, window.to).await?;

        let start = Instant::now();
        let data = reduce(&events);
        record_aggregation(report, start.elapsed().as_secs_f64());

        tracing::debug!(%app_id, report, events = events.len(), "Report computed");

        Ok(WindowedReport {
            app_id,
            from: window.from,
            to: window.to,
            report: data,
        })
    }

    fn default_window(&self, query: &RangeQuery, now: DateTime<Utc>) -> Result<ReportWindow> {
        query.window(now, self.config.default_range_days)
    }

    pub async fn summary(
        &self,
        viewer: &Viewer,
        app_id: Uuid,
        query: &RangeQuery,
        now: DateTime<Utc>,
    ) -> Result<WindowedReport<analytics::EventSummary>> {
        let window = self.default_window(query, now)?;
        self.over_events(viewer, app_id, window, "summary", analytics::event_summary)
            .await
    }

    pub async fn conversations(
        &self,
        viewer: &Viewer,
        app_id: Uuid,
        query: &RangeQuery,
        now: DateTime<Utc>,
    ) -> Result<WindowedReport<analytics::ConversationMetrics>> {
        let window = self.default_window(query, now)?;
        self.over_events(viewer, app_id, window, "conversations", |events| {
            analytics::conversation_metrics(events, now)
        })
        .await
    }

    pub async fn usage(
        &self,
        viewer: &Viewer,
        app_id: Uuid,
        query: &RangeQuery,
        now: DateTime<Utc>,
    ) -> Result<WindowedReport<analytics::UsagePatterns>> {
        let window = self.default_window(query, now)?;
        self.over_events(viewer, app_id, window, "usage", |events| {
            analytics::usage_patterns(events, window.to)
        })
        .await
    }

    pub async fn retention(
        &self,
        viewer: &Viewer,
        app_id: Uuid,
        query: &RangeQuery,
        now: DateTime<Utc>,
    ) -> Result<WindowedReport<analytics::RetentionReport>> {
        let window = query.window(now, self.config.retention_range_days)?;
        self.authorize(viewer, app_id).await?;

        let events = self.store.events_in_range(app_id, window.from, window.to).await?;
        let users: Vec<String> = events
            .iter()
            .filter_map(|e| e.user_hash.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let first_seen = self.store.first_seen(app_id, &users, window.to).await?;

        let start = Instant::now();
        let report = analytics::retention_report(&events, &first_seen, window.to);
        record_aggregation("retention", start.elapsed().as_secs_f64());

        tracing::debug!(%app_id, events = events.len(), users = users.len(), "Report computed");

        Ok(WindowedReport {
            app_id,
            from: window.from,
            to: window.to,
            report,
        })
    }

    pub async fn prompts(
        &self,
        viewer: &Viewer,
        app_id: Uuid,
        query: &RangeQuery,
        now: DateTime<Utc>,
    ) -> Result<WindowedReport<Items<analytics::PromptPattern>>> {
        let window = self.default_window(query, now)?;
        let limit = query
            .limit
            .unwrap_or(DEFAULT_PATTERN_LIMIT)
            .min(self.config.max_prompt_patterns);

        self.over_events(viewer, app_id, window, "prompts", |events| Items {
            items: analytics::prompt_patterns(events, limit),
        })
        .await
    }

    pub async fn funnel(
        &self,
        viewer: &Viewer,
        app_id: Uuid,
        query: &RangeQuery,
        now: DateTime<Utc>,
    ) -> Result<WindowedReport<analytics::FunnelReport>> {
        let window = self.default_window(query, now)?;
        self.authorize(viewer, app_id).await?;

        let (first, last) = (window.first_day(), window.last_day());
        let rows = self.store.daily_metrics(app_id, first, last).await?;

        let start = Instant::now();
        let counts: Vec<analytics::DailyCounts> = rows.iter().map(Into::into).collect();
        let report = analytics::conversion_funnel(&counts, first, last);
        record_aggregation("funnel", start.elapsed().as_secs_f64());

        Ok(WindowedReport {
            app_id,
            from: window.from,
            to: window.to,
            report,
        })
    }

    pub async fn revenue(
        &self,
        viewer: &Viewer,
        app_id: Uuid,
        query: &RangeQuery,
        now: DateTime<Utc>,
    ) -> Result<WindowedReport<analytics::RevenueReport>> {
        let window = self.default_window(query, now)?;
        self.over_events(viewer, app_id, window, "revenue", analytics::revenue_report)
            .await
    }

    pub async fn sources(
        &self,
        viewer: &Viewer,
        app_id: Uuid,
        query: &RangeQuery,
        now: DateTime<Utc>,
    ) -> Result<WindowedReport<Items<analytics::SourceBreakdown>>> {
        let window = self.default_window(query, now)?;
        self.over_events(viewer, app_id, window, "sources", |events| Items {
            items: analytics::traffic_sources(events),
        })
        .await
    }

    /// Category benchmark; needs a plan with `benchmarks`
    pub async fn benchmarks(
        &self,
        viewer: &Viewer,
        app_id: Uuid,
        query: &RangeQuery,
        now: DateTime<Utc>,
    ) -> Result<WindowedReport<analytics::BenchmarkReport>> {
        let window = self.default_window(query, now)?;
        let projection = self.authorize(viewer, app_id).await?;

        if !projection.plan.allows(Feature::Benchmarks) {
            return Err(AppError::PlanRequired {
                feature: Feature::Benchmarks.to_string(),
                plan: projection.plan.to_string(),
            });
        }

        let category = projection.app.category();
        let stats = self
            .store
            .category_app_stats(category, window.from, window.to)
            .await?;

        let start = Instant::now();
        let report = analytics::category_benchmark(category, &stats, app_id);
        record_aggregation("benchmarks", start.elapsed().as_secs_f64());

        Ok(WindowedReport {
            app_id,
            from: window.from,
            to: window.to,
            report,
        })
    }

    /// Feature table for the app's current plan
    pub async fn features(&self, viewer: &Viewer, app_id: Uuid) -> Result<FeatureTable> {
        let projection = self.authorize(viewer, app_id).await?;
        let plan = projection.plan;

        Ok(FeatureTable {
            app_id,
            plan,
            retention_days: self.retention.days_for(plan),
            features: Feature::ALL
                .iter()
                .map(|feature| FeatureFlag {
                    feature: *feature,
                    enabled: plan.allows(*feature),
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::generate_write_key;
    use crate::config::{AnalyticsConfig, IngestConfig, RetentionConfig};
    use crate::db::models::{AppCategory, EventType};
    use crate::db::{MemoryStore, NewEvent};
    use crate::ratelimit::WriteKeyLimiter;
    use crate::services::IngestService;
    use crate::ErrorCode;
    use chrono::TimeZone;
    use serde_json::json;

    struct Harness {
        store: Arc<MemoryStore>,
        insights: InsightsService,
        viewer: Viewer,
        app_id: Uuid,
        org_id: Uuid,
        key: String,
    }

    async fn harness(plan: Plan) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let org = store.insert_org("Acme", plan).await;
        let key = generate_write_key();
        let app = store
            .insert_app(org.id, "Coach", AppCategory::Lifestyle, &key, 1000)
            .await;
        let user_id = Uuid::new_v4();
        store.add_member(org.id, user_id, "owner").await;

        let insights = InsightsService::new(
            store.clone(),
            &AnalyticsConfig::default(),
            &RetentionConfig::default(),
        );

        Harness {
            store,
            insights,
            viewer: Viewer {
                user_id,
                org_id: Some(org.id),
                scopes: vec![],
            },
            app_id: app.id,
            org_id: org.id,
            key,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 20, 15, 0, 0).unwrap()
    }

    #[test]
    fn test_window_defaults_and_bounds() {
        let window = RangeQuery::default().window(now(), 30).unwrap();
        assert_eq!(window.to, now());
        assert_eq!(window.from, now() - Duration::days(30));

        let week = RangeQuery {
            days: Some(7),
            ..RangeQuery::default()
        };
        assert_eq!(week.window(now(), 30).unwrap().from, now() - Duration::days(7));

        let inverted = RangeQuery {
            from: Some(now()),
            to: Some(now() - Duration::hours(1)),
            ..RangeQuery::default()
        };
        let err = inverted.window(now(), 30).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        let too_long = RangeQuery {
            days: Some(366),
            ..RangeQuery::default()
        };
        assert!(too_long.window(now(), 30).is_err());
    }

    #[test]
    fn test_explicit_range_is_capped() {
        let full_year = RangeQuery {
            from: Some(now() - Duration::days(MAX_RANGE_DAYS)),
            to: Some(now()),
            ..RangeQuery::default()
        };
        assert!(full_year.window(now(), 30).is_ok());

        let ancient = RangeQuery {
            from: Some(Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0).unwrap()),
            ..RangeQuery::default()
        };
        let err = ancient.window(now(), 30).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert!(matches!(err, AppError::Validation { field: Some(ref f), .. } if f == "from"));
    }

    #[tokio::test]
    async fn test_retention_cohort_uses_first_ever_event() {
        let h = harness(Plan::Team).await;
        for age in [200, 20] {
            let at = now() - Duration::days(age);
            let mut event = NewEvent::new(h.app_id, EventType::Invoked, at);
            event.user_hash = Some(crate::hashing::hash_identifier("veteran"));
            h.store.insert_event(event).await.unwrap();
        }

        let report = h
            .insights
            .retention(&h.viewer, h.app_id, &RangeQuery::default(), now())
            .await
            .unwrap();

        let first_day = (now() - Duration::days(200)).date_naive();
        let first_week = analytics::retention::cohort_week(first_day);
        let cohorts: Vec<NaiveDate> =
            report.report.cohorts.iter().map(|c| c.cohort_week).collect();
        assert_eq!(cohorts, vec![first_week]);
        assert_eq!(report.report.total_users, 1);
    }

    #[tokio::test]
    async fn test_ingest_then_conversation_report() {
        let h = harness(Plan::Free).await;
        let ingest = IngestService::new(
            h.store.clone(),
            Arc::new(WriteKeyLimiter::new()),
            &IngestConfig::default(),
        );

        let t = now() - Duration::minutes(10);
        for (i, kind) in ["invoked", "completed", "invoked", "error"].iter().enumerate() {
            let body = serde_json::to_vec(&json!({"event": kind, "user_id": "u1"})).unwrap();
            ingest
                .ingest(Some(&h.key), &body, t + Duration::seconds(i as i64))
                .await
                .unwrap();
        }

        let report = h
            .insights
            .conversations(&h.viewer, h.app_id, &RangeQuery::default(), now())
            .await
            .unwrap();

        assert_eq!(report.report.total_conversations, 1);
        assert_eq!(report.report.total_messages, 2);
        assert_eq!(report.report.error_rate, 50.0);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["totalConversations"], 1);
        assert_eq!(json["appId"], h.app_id.to_string());
    }

    #[tokio::test]
    async fn test_empty_app_gets_zeroed_reports() {
        let h = harness(Plan::Pro).await;
        let query = RangeQuery::default();

        let summary = h.insights.summary(&h.viewer, h.app_id, &query, now()).await.unwrap();
        assert_eq!(summary.report.total_events, 0);

        let funnel = h.insights.funnel(&h.viewer, h.app_id, &query, now()).await.unwrap();
        assert_eq!(funnel.report.invoked, 0);
        assert_eq!(funnel.report.days.len(), 31);

        let prompts = h.insights.prompts(&h.viewer, h.app_id, &query, now()).await.unwrap();
        assert!(prompts.report.items.is_empty());
    }

    #[tokio::test]
    async fn test_authorization() {
        let h = harness(Plan::Pro).await;
        let query = RangeQuery::default();

        let missing = h
            .insights
            .summary(&h.viewer, Uuid::new_v4(), &query, now())
            .await
            .unwrap_err();
        assert_eq!(missing.code(), ErrorCode::AppNotFound);

        let other_org = Viewer {
            org_id: Some(Uuid::new_v4()),
            ..h.viewer.clone()
        };
        let err = h.insights.summary(&other_org, h.app_id, &query, now()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::TenantMismatch);

        let stranger = Viewer {
            user_id: Uuid::new_v4(),
            org_id: Some(h.org_id),
            scopes: vec![],
        };
        let err = h.insights.summary(&stranger, h.app_id, &query, now()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn test_benchmarks_are_plan_gated() {
        let h = harness(Plan::Free).await;
        let err = h
            .insights
            .benchmarks(&h.viewer, h.app_id, &RangeQuery::default(), now())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::PlanRequired);
        assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);

        h.store.set_plan(h.org_id, Plan::Pro).await;
        let report = h
            .insights
            .benchmarks(&h.viewer, h.app_id, &RangeQuery::default(), now())
            .await
            .unwrap();
        assert!(!report.report.available);
        assert_eq!(report.report.app_count, 1);
    }

    #[tokio::test]
    async fn test_benchmarks_available_at_floor() {
        let h = harness(Plan::Team).await;
        for i in 0..analytics::K_ANONYMITY_FLOOR - 1 {
            let org = h.store.insert_org(&format!("Peer {}", i), Plan::Free).await;
            h.store
                .insert_app(org.id, "Peer", AppCategory::Lifestyle, &generate_write_key(), 10)
                .await;
        }

        let report = h
            .insights
            .benchmarks(&h.viewer, h.app_id, &RangeQuery::default(), now())
            .await
            .unwrap();
        assert!(report.report.available);
        assert_eq!(report.report.app_count, analytics::K_ANONYMITY_FLOOR);
        assert!(report.report.your_app.is_some());
    }

    #[tokio::test]
    async fn test_feature_table() {
        let h = harness(Plan::Pro).await;
        let table = h.insights.features(&h.viewer, h.app_id).await.unwrap();

        assert_eq!(table.plan, Plan::Pro);
        assert_eq!(table.retention_days, 90);
        let enabled: Vec<Feature> = table
            .features
            .iter()
            .filter(|f| f.enabled)
            .map(|f| f.feature)
            .collect();
        assert_eq!(enabled, vec![Feature::Benchmarks, Feature::CsvExport]);
    }
}
