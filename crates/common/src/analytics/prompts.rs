//! Prompt pattern analysis over hashed prompts

use serde::Serialize;
use std::collections::HashMap;

use super::{mean, ratio_pct};
use crate::db::models::{Event, EventType};

/// Patterns returned when the caller gives no limit
pub const DEFAULT_PATTERN_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptPattern {
    pub prompt_hash: String,
    pub total_uses: u64,
    pub invoked: u64,
    pub completed: u64,
    pub converted: u64,
    pub errors: u64,
    pub success_rate: f64,
    pub conversion_rate: f64,
    pub error_rate: f64,
    pub avg_latency_ms: f64,
}

#[derive(Default)]
struct Tally {
    first_seen: usize,
    total: u64,
    invoked: u64,
    completed: u64,
    converted: u64,
    errors: u64,
    latency_sum: f64,
    latency_samples: u64,
}

/// Per-prompt stats sorted by use count, most used first. Equal counts
/// keep the order in which the prompts first appeared.
pub fn prompt_patterns(events: &[Event], limit: usize) -> Vec<PromptPattern> {
    let mut tallies: HashMap<&str, Tally> = HashMap::new();

    for event in events {
        let Some(prompt) = event.prompt_hash.as_deref() else {
            continue;
        };
        let next = tallies.len();
        let tally = tallies.entry(prompt).or_insert_with(|| Tally {
            first_seen: next,
            ..Tally::default()
        });

        tally.total += 1;
        match event.kind() {
            Some(EventType::Invoked) => tally.invoked += 1,
            Some(EventType::Completed) => tally.completed += 1,
            Some(EventType::Converted) => tally.converted += 1,
            Some(EventType::Error) => tally.errors += 1,
            _ => {}
        }
        if let Some(latency) = event.latency_ms {
            tally.latency_sum += latency as f64;
            tally.latency_samples += 1;
        }
    }

    let mut ranked: Vec<(&str, Tally)> = tallies.into_iter().collect();
    ranked.sort_by_key(|(_, tally)| tally.first_seen);
    ranked.sort_by(|a, b| b.1.total.cmp(&a.1.total));

    ranked
        .into_iter()
        .take(limit)
        .map(|(prompt, t)| PromptPattern {
            prompt_hash: prompt.to_string(),
            total_uses: t.total,
            invoked: t.invoked,
            completed: t.completed,
            converted: t.converted,
            errors: t.errors,
            success_rate: ratio_pct(t.completed, t.total),
            conversion_rate: ratio_pct(t.converted, t.total),
            error_rate: ratio_pct(t.errors, t.invoked),
            avg_latency_ms: mean(t.latency_sum, t.latency_samples),
        })
        .collect()
}
