//! Storage interface used by the services
//!
//! `Repository` implements it over PostgreSQL; `MemoryStore` implements it
//! in-process for tests and local development.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::analytics::benchmark::AppStats;
use crate::db::models::{App, AppCategory, DailyMetric, Event, EventType};
use crate::errors::Result;
use crate::plans::Plan;

/// App row together with its owning org's plan
#[derive(Debug, Clone)]
pub struct AppProjection {
    pub app: App,
    pub org_name: String,
    pub plan: Plan,
}

/// A validated event ready to be written
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub app_id: Uuid,
    pub event_type: EventType,
    pub event_name: Option<String>,
    pub properties: serde_json::Value,
    pub prompt_hash: Option<String>,
    pub user_hash: Option<String>,
    pub error_message: Option<String>,
    pub latency_ms: Option<i64>,
    pub revenue: Option<f64>,
    pub currency: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl NewEvent {
    /// Bare event of the given type, used by tests and fixtures
    pub fn new(app_id: Uuid, event_type: EventType, timestamp: DateTime<Utc>) -> Self {
        Self {
            app_id,
            event_type,
            event_name: None,
            properties: serde_json::json!({}),
            prompt_hash: None,
            user_hash: None,
            error_message: None,
            latency_ms: None,
            revenue: None,
            currency: None,
            timestamp,
        }
    }

    /// Materialize the row that will be stored under `id`
    pub fn into_model(self, id: Uuid) -> Event {
        Event {
            id,
            app_id: self.app_id,
            event_type: self.event_type.as_str().to_string(),
            event_name: self.event_name,
            properties: self.properties,
            prompt_hash: self.prompt_hash,
            user_hash: self.user_hash,
            error_message: self.error_message,
            latency_ms: self.latency_ms,
            revenue: self.revenue,
            currency: self.currency,
            timestamp: self.timestamp.into(),
        }
    }
}

/// Midnight UTC opening `date`
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Rows matched (or removed) by a retention pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExpiredCounts {
    pub events: u64,
    pub daily_metrics: u64,
}

#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    /// Check datastore connectivity
    async fn ping(&self) -> Result<()>;

    /// Active app owning the write key with this hash
    async fn find_app_by_key_hash(&self, key_hash: &str) -> Result<Option<AppProjection>>;

    /// App by id, active or not
    async fn find_app(&self, app_id: Uuid) -> Result<Option<AppProjection>>;

    async fn is_org_member(&self, org_id: Uuid, user_id: Uuid) -> Result<bool>;

    /// Persist one event and bump its daily counters atomically
    async fn insert_event(&self, event: NewEvent) -> Result<Event>;

    /// Events of one app with `from <= timestamp < to`, oldest first
    async fn events_in_range(
        &self,
        app_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>>;

    /// Day of the earliest event before `before` for each listed user of
    /// one app, however old. Users with no such event are absent.
    async fn first_seen(
        &self,
        app_id: Uuid,
        user_hashes: &[String],
        before: DateTime<Utc>,
    ) -> Result<HashMap<String, NaiveDate>>;

    /// Daily counter rows with `from <= date <= to`, oldest first
    async fn daily_metrics(
        &self,
        app_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyMetric>>;

    /// Per-app totals for every active app in a category
    async fn category_app_stats(
        &self,
        category: AppCategory,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AppStats>>;

    /// Rows of apps on `plan` dated before the UTC day of `cutoff`.
    /// Events and daily counter rows share that day boundary.
    async fn count_expired(&self, plan: Plan, cutoff: DateTime<Utc>) -> Result<ExpiredCounts>;

    /// Delete the rows `count_expired` would match
    async fn delete_expired(&self, plan: Plan, cutoff: DateTime<Utc>) -> Result<ExpiredCounts>;
}
