//! Anonymous category benchmarks
//!
//! Compares one app with every active app in its category. Figures are only
//! released when the category holds at least `K_ANONYMITY_FLOOR` distinct
//! apps, so no single competitor can be singled out.

use serde::Serialize;
use std::collections::HashSet;
use uuid::Uuid;

use super::{mean, ratio_pct, round2};
use crate::db::models::{AppCategory, Event, EventType};

/// Minimum number of distinct apps before any benchmark is shown
pub const K_ANONYMITY_FLOOR: usize = 5;

/// Window totals of one app, as returned by the store
#[derive(Debug, Clone, PartialEq)]
pub struct AppStats {
    pub app_id: Uuid,
    pub total_events: u64,
    pub invoked: u64,
    pub completed: u64,
    pub converted: u64,
    pub errors: u64,
    pub latency_sum_ms: f64,
    pub latency_samples: u64,
}

impl AppStats {
    pub fn empty(app_id: Uuid) -> Self {
        Self {
            app_id,
            total_events: 0,
            invoked: 0,
            completed: 0,
            converted: 0,
            errors: 0,
            latency_sum_ms: 0.0,
            latency_samples: 0,
        }
    }

    /// Fold one event into the totals
    pub fn record(&mut self, event: &Event) {
        self.total_events += 1;
        match event.kind() {
            Some(EventType::Invoked) => self.invoked += 1,
            Some(EventType::Completed) => self.completed += 1,
            Some(EventType::Converted) => self.converted += 1,
            Some(EventType::Error) => self.errors += 1,
            _ => {}
        }
        if let Some(latency) = event.latency_ms {
            self.latency_sum_ms += latency as f64;
            self.latency_samples += 1;
        }
    }

    pub fn conversion_rate(&self) -> f64 {
        ratio_pct(self.converted, self.invoked)
    }

    pub fn error_rate(&self) -> f64 {
        ratio_pct(self.errors, self.invoked)
    }

    pub fn avg_latency_ms(&self) -> Option<f64> {
        (self.latency_samples > 0).then(|| mean(self.latency_sum_ms, self.latency_samples))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryFigures {
    pub avg_conversion_rate: f64,
    pub median_conversion_rate: f64,
    pub avg_error_rate: f64,
    pub avg_latency_ms: f64,
    pub avg_events_per_app: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnFigures {
    pub total_events: u64,
    pub conversion_rate: f64,
    pub error_rate: f64,
    pub avg_latency_ms: f64,
    /// Share of category apps converting strictly worse than this one
    pub conversion_percentile: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkReport {
    pub available: bool,
    pub category: AppCategory,
    pub app_count: usize,
    pub min_apps_required: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub benchmarks: Option<CategoryFigures>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub your_app: Option<OwnFigures>,
}

fn median(sorted: &[f64]) -> f64 {
    match sorted.len() {
        0 => 0.0,
        n if n % 2 == 1 => sorted[n / 2],
        n => round2((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0),
    }
}

pub fn category_benchmark(
    category: AppCategory,
    stats: &[AppStats],
    own_app: Uuid,
) -> BenchmarkReport {
    let mut seen = HashSet::new();
    let apps: Vec<&AppStats> = stats.iter().filter(|s| seen.insert(s.app_id)).collect();
    let app_count = apps.len();

    if app_count < K_ANONYMITY_FLOOR {
        return BenchmarkReport {
            available: false,
            category,
            app_count,
            min_apps_required: K_ANONYMITY_FLOOR,
            benchmarks: None,
            your_app: None,
        };
    }

    let mut conversion: Vec<f64> = apps.iter().map(|s| s.conversion_rate()).collect();
    conversion.sort_by(f64::total_cmp);

    let latencies: Vec<f64> = apps.iter().filter_map(|s| s.avg_latency_ms()).collect();
    let total_events: u64 = apps.iter().map(|s| s.total_events).sum();

    let benchmarks = CategoryFigures {
        avg_conversion_rate: mean(conversion.iter().sum(), app_count as u64),
        median_conversion_rate: median(&conversion),
        avg_error_rate: mean(apps.iter().map(|s| s.error_rate()).sum(), app_count as u64),
        avg_latency_ms: mean(latencies.iter().sum(), latencies.len() as u64),
        avg_events_per_app: mean(total_events as f64, app_count as u64),
    };

    let your_app = apps.iter().find(|s| s.app_id == own_app).map(|own| {
        let rate = own.conversion_rate();
        let below = conversion.iter().filter(|r| **r < rate).count() as u64;
        OwnFigures {
            total_events: own.total_events,
            conversion_rate: rate,
            error_rate: own.error_rate(),
            avg_latency_ms: own.avg_latency_ms().unwrap_or(0.0),
            conversion_percentile: ratio_pct(below, app_count as u64),
        }
    });

    BenchmarkReport {
        available: true,
        category,
        app_count,
        min_apps_required: K_ANONYMITY_FLOOR,
        benchmarks: Some(benchmarks),
        your_app,
    }
}
