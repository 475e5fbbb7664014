//! In-memory `AnalyticsStore`
//!
//! Mirrors the PostgreSQL repository semantics (including the daily
//! counter cache) for tests and local runs.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::analytics::benchmark::AppStats;
use crate::auth::hash_write_key;
use crate::db::models::{App, AppCategory, DailyMetric, Event, EventType, Org, OrgMember};
use crate::db::store::{start_of_day, AnalyticsStore, AppProjection, ExpiredCounts, NewEvent};
use crate::errors::Result;
use crate::plans::Plan;

#[derive(Debug, Default, Clone, Copy)]
struct FunnelCounters {
    invoked: i64,
    completed: i64,
    converted: i64,
}

/// Thread-safe in-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    orgs: RwLock<HashMap<Uuid, Org>>,
    members: RwLock<Vec<OrgMember>>,
    apps: RwLock<HashMap<Uuid, App>>,
    events: RwLock<Vec<Event>>,
    daily: RwLock<BTreeMap<(Uuid, NaiveDate), FunnelCounters>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an org on the given plan
    pub async fn insert_org(&self, name: &str, plan: Plan) -> Org {
        let now = Utc::now();
        let org = Org {
            id: Uuid::new_v4(),
            name: name.to_string(),
            plan: plan.as_str().to_string(),
            stripe_customer_id: None,
            stripe_subscription_id: None,
            subscription_status: None,
            created_at: now.into(),
            updated_at: now.into(),
        };
        self.orgs.write().await.insert(org.id, org.clone());
        org
    }

    /// Change an org's plan, as a billing webhook would
    pub async fn set_plan(&self, org_id: Uuid, plan: Plan) {
        if let Some(org) = self.orgs.write().await.get_mut(&org_id) {
            org.plan = plan.as_str().to_string();
            org.updated_at = Utc::now().into();
        }
    }

    pub async fn add_member(&self, org_id: Uuid, user_id: Uuid, role: &str) {
        self.members.write().await.push(OrgMember {
            id: Uuid::new_v4(),
            org_id,
            user_id,
            role: role.to_string(),
            created_at: Utc::now().into(),
        });
    }

    /// Register an active app owning `write_key`
    pub async fn insert_app(
        &self,
        org_id: Uuid,
        name: &str,
        category: AppCategory,
        write_key: &str,
        rate_limit_per_sec: i32,
    ) -> App {
        let app = App {
            id: Uuid::new_v4(),
            org_id,
            name: name.to_string(),
            category: category.as_str().to_string(),
            write_key_hash: hash_write_key(write_key),
            rate_limit_per_sec,
            is_active: true,
            created_at: Utc::now().into(),
        };
        self.apps.write().await.insert(app.id, app.clone());
        app
    }

    pub async fn set_app_active(&self, app_id: Uuid, active: bool) {
        if let Some(app) = self.apps.write().await.get_mut(&app_id) {
            app.is_active = active;
        }
    }

    /// Snapshot of every stored event
    pub async fn all_events(&self) -> Vec<Event> {
        self.events.read().await.clone()
    }

    async fn project(&self, app: &App) -> Option<AppProjection> {
        let orgs = self.orgs.read().await;
        let org = orgs.get(&app.org_id)?;
        Some(AppProjection {
            app: app.clone(),
            org_name: org.name.clone(),
            plan: org.plan(),
        })
    }

    /// App ids whose org is currently on `plan`
    async fn apps_on_plan(&self, plan: Plan) -> Vec<Uuid> {
        let orgs = self.orgs.read().await;
        self.apps
            .read()
            .await
            .values()
            .filter(|app| orgs.get(&app.org_id).map(|org| org.plan()) == Some(plan))
            .map(|app| app.id)
            .collect()
    }

    async fn expired(&self, plan: Plan, cutoff: DateTime<Utc>, delete: bool) -> ExpiredCounts {
        let app_ids = self.apps_on_plan(plan).await;
        let cutoff_date = cutoff.date_naive();
        let cutoff = start_of_day(cutoff_date);

        let mut events = self.events.write().await;
        let expired_events = events
            .iter()
            .filter(|e| app_ids.contains(&e.app_id) && e.timestamp_utc() < cutoff)
            .count();
        if delete {
            events.retain(|e| !(app_ids.contains(&e.app_id) && e.timestamp_utc() < cutoff));
        }

        let mut daily = self.daily.write().await;
        let is_expired =
            |(app_id, date): &(Uuid, NaiveDate)| app_ids.contains(app_id) && *date < cutoff_date;
        let expired_daily = daily.keys().filter(|key| is_expired(key)).count();
        if delete {
            daily.retain(|key, _| !is_expired(key));
        }

        ExpiredCounts {
            events: expired_events as u64,
            daily_metrics: expired_daily as u64,
        }
    }
}

#[async_trait]
impl AnalyticsStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn find_app_by_key_hash(&self, key_hash: &str) -> Result<Option<AppProjection>> {
        let app = self
            .apps
            .read()
            .await
            .values()
            .find(|app| app.write_key_hash == key_hash && app.is_active)
            .cloned();

        match app {
            Some(app) => Ok(self.project(&app).await),
            None => Ok(None),
        }
    }

    async fn find_app(&self, app_id: Uuid) -> Result<Option<AppProjection>> {
        let app = self.apps.read().await.get(&app_id).cloned();
        match app {
            Some(app) => Ok(self.project(&app).await),
            None => Ok(None),
        }
    }

    async fn is_org_member(&self, org_id: Uuid, user_id: Uuid) -> Result<bool> {
        Ok(self
            .members
            .read()
            .await
            .iter()
            .any(|m| m.org_id == org_id && m.user_id == user_id))
    }

    async fn insert_event(&self, event: NewEvent) -> Result<Event> {
        let kind = event.event_type;
        let key = (event.app_id, event.timestamp.date_naive());
        let stored = event.into_model(Uuid::new_v4());

        // Both locks held together so readers never see one without the other
        let mut events = self.events.write().await;
        let mut daily = self.daily.write().await;

        if kind.is_funnel_step() {
            let counters = daily.entry(key).or_default();
            match kind {
                EventType::Invoked => counters.invoked += 1,
                EventType::Completed => counters.completed += 1,
                _ => counters.converted += 1,
            }
        }
        events.push(stored.clone());

        Ok(stored)
    }

    async fn events_in_range(
        &self,
        app_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let mut events: Vec<Event> = self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.app_id == app_id)
            .filter(|e| {
                let ts = e.timestamp_utc();
                ts >= from && ts < to
            })
            .cloned()
            .collect();

        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    async fn first_seen(
        &self,
        app_id: Uuid,
        user_hashes: &[String],
        before: DateTime<Utc>,
    ) -> Result<HashMap<String, NaiveDate>> {
        let mut first: HashMap<String, NaiveDate> = HashMap::new();
        for event in self.events.read().await.iter() {
            let Some(user) = event.user_hash.as_ref() else {
                continue;
            };
            let ts = event.timestamp_utc();
            if event.app_id != app_id || ts >= before || !user_hashes.contains(user) {
                continue;
            }
            let day = ts.date_naive();
            first
                .entry(user.clone())
                .and_modify(|seen| *seen = (*seen).min(day))
                .or_insert(day);
        }
        Ok(first)
    }

    async fn daily_metrics(
        &self,
        app_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DailyMetric>> {
        let now = Utc::now();
        Ok(self
            .daily
            .read()
            .await
            .range((app_id, from)..=(app_id, to))
            .map(|(&(app_id, date), counters)| DailyMetric {
                app_id,
                date,
                invoked: counters.invoked,
                completed: counters.completed,
                converted: counters.converted,
                updated_at: now.into(),
            })
            .collect())
    }

    async fn category_app_stats(
        &self,
        category: AppCategory,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AppStats>> {
        let apps = self.apps.read().await;
        let events = self.events.read().await;

        let mut stats: Vec<AppStats> = apps
            .values()
            .filter(|app| app.is_active && app.category() == category)
            .map(|app| AppStats::empty(app.id))
            .collect();

        for entry in stats.iter_mut() {
            let app_id = entry.app_id;
            for event in events.iter().filter(|e| e.app_id == app_id) {
                let ts = event.timestamp_utc();
                if ts >= from && ts < to {
                    entry.record(event);
                }
            }
        }

        Ok(stats)
    }

    async fn count_expired(&self, plan: Plan, cutoff: DateTime<Utc>) -> Result<ExpiredCounts> {
        Ok(self.expired(plan, cutoff, false).await)
    }

    async fn delete_expired(&self, plan: Plan, cutoff: DateTime<Utc>) -> Result<ExpiredCounts> {
        Ok(self.expired(plan, cutoff, true).await)
    }
}
