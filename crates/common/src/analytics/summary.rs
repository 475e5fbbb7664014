//! Headline counts for the dashboard overview

use serde::Serialize;
use std::collections::HashSet;

use super::{mean, ratio_pct};
use crate::db::models::{Event, EventType};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub total_events: u64,
    pub invoked: u64,
    pub completed: u64,
    pub errors: u64,
    pub converted: u64,
    pub custom: u64,
    pub unique_users: u64,
    pub completion_rate: f64,
    pub conversion_rate: f64,
    pub error_rate: f64,
    pub avg_latency_ms: f64,
}

pub fn event_summary(events: &[Event]) -> EventSummary {
    let mut counts = [0u64; 5];
    let mut users = HashSet::new();
    let mut latency_sum = 0.0;
    let mut latency_samples = 0u64;

    for event in events {
        let slot = match event.kind() {
            Some(EventType::Invoked) => 0,
            Some(EventType::Completed) => 1,
            Some(EventType::Error) => 2,
            Some(EventType::Converted) => 3,
            Some(EventType::Custom) | None => 4,
        };
        counts[slot] += 1;

        if let Some(user) = event.user_hash.as_deref() {
            users.insert(user);
        }
        if let Some(latency) = event.latency_ms {
            latency_sum += latency as f64;
            latency_samples += 1;
        }
    }

    let [invoked, completed, errors, converted, custom] = counts;

    EventSummary {
        total_events: events.len() as u64,
        invoked,
        completed,
        errors,
        converted,
        custom,
        unique_users: users.len() as u64,
        completion_rate: ratio_pct(completed, invoked),
        conversion_rate: ratio_pct(converted, invoked),
        error_rate: ratio_pct(errors, invoked),
        avg_latency_ms: mean(latency_sum, latency_samples),
    }
}
