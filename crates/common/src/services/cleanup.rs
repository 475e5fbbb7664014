//! Retention cleanup
//!
//! Removes events (and their daily counter rows) older than each plan's
//! retention period. Runs from the `cleanup` binary or the admin endpoint.
//! A second run with the same `now` finds nothing to delete.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::config::RetentionConfig;
use crate::db::{start_of_day, AnalyticsStore, ExpiredCounts};
use crate::errors::Result;
use crate::metrics::record_cleanup;
use crate::plans::Plan;

/// Days of history kept per plan. Zero keeps history forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub free_days: u32,
    pub pro_days: u32,
    pub team_days: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            free_days: Plan::Free.default_retention_days(),
            pro_days: Plan::Pro.default_retention_days(),
            team_days: Plan::Team.default_retention_days(),
        }
    }
}

impl From<&RetentionConfig> for RetentionPolicy {
    fn from(config: &RetentionConfig) -> Self {
        Self {
            free_days: config.free_days,
            pro_days: config.pro_days,
            team_days: config.team_days,
        }
    }
}

impl RetentionPolicy {
    pub fn days_for(&self, plan: Plan) -> u32 {
        match plan {
            Plan::Free => self.free_days,
            Plan::Pro => self.pro_days,
            Plan::Team => self.team_days,
        }
    }

    /// Oldest timestamp still kept for `plan`, `None` when nothing expires.
    /// Always the start of a UTC day, so events and daily rows expire together.
    pub fn cutoff(&self, plan: Plan, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self.days_for(plan) {
            0 => None,
            days => Some(start_of_day((now - Duration::days(days as i64)).date_naive())),
        }
    }
}

/// Outcome for one plan tier
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierCleanup {
    pub plan: Plan,
    pub retention_days: u32,
    pub cutoff: Option<DateTime<Utc>>,
    pub events: u64,
    pub daily_metrics: u64,
}

/// Outcome of one cleanup pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupReport {
    pub dry_run: bool,
    pub tiers: Vec<TierCleanup>,
    pub total_events: u64,
    pub total_daily_metrics: u64,
    pub duration_ms: u64,
}

pub struct CleanupJob {
    store: Arc<dyn AnalyticsStore>,
    policy: RetentionPolicy,
}

impl CleanupJob {
    pub fn new(store: Arc<dyn AnalyticsStore>, policy: RetentionPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Delete (or with `dry_run`, count) expired rows for every plan
    pub async fn run(&self, dry_run: bool, now: DateTime<Utc>) -> Result<CleanupReport> {
        let start = Instant::now();
        let mut tiers = Vec::with_capacity(Plan::ALL.len());

        for plan in Plan::ALL {
            let retention_days = self.policy.days_for(plan);
            let cutoff = self.policy.cutoff(plan, now);

            let counts = match cutoff {
                None => ExpiredCounts::default(),
                Some(cutoff) if dry_run => self.store.count_expired(plan, cutoff).await?,
                Some(cutoff) => {
                    let removed = self.store.delete_expired(plan, cutoff).await?;
                    record_cleanup(plan.as_str(), removed.events, removed.daily_metrics);
                    removed
                }
            };

            tracing::info!(
                plan = %plan,
                retention_days,
                dry_run,
                events = counts.events,
                daily_metrics = counts.daily_metrics,
                "Retention tier processed"
            );

            tiers.push(TierCleanup {
                plan,
                retention_days,
                cutoff,
                events: counts.events,
                daily_metrics: counts.daily_metrics,
            });
        }

        let report = CleanupReport {
            dry_run,
            total_events: tiers.iter().map(|t| t.events).sum(),
            total_daily_metrics: tiers.iter().map(|t| t.daily_metrics).sum(),
            tiers,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        tracing::info!(
            dry_run,
            total_events = report.total_events,
            total_daily_metrics = report.total_daily_metrics,
            duration_ms = report.duration_ms,
            "Retention cleanup finished"
        );

        Ok(report)
    }
}
