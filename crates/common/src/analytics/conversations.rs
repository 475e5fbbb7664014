//! Conversation metrics
//!
//! A conversation is the set of events sharing one `user_hash`. Events
//! without a user hash still count toward totals but belong to no
//! conversation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use super::{ratio_pct, round2};
use crate::db::models::{Event, EventType};

/// Size buckets as `(label, min, max)`; first match wins
const SIZE_BUCKETS: [(&str, u64, u64); 5] = [
    ("1", 1, 1),
    ("2-5", 2, 5),
    ("6-10", 6, 10),
    ("11-20", 11, 20),
    ("20+", 21, u64::MAX),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeBucket {
    pub bucket: &'static str,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMetrics {
    pub total_conversations: u64,
    pub total_messages: u64,
    pub avg_events_per_conversation: f64,
    pub single_event_pct: f64,
    pub active_today: u64,
    pub total_errors: u64,
    pub error_rate: f64,
    pub size_distribution: Vec<SizeBucket>,
}

#[derive(Default)]
struct Conversation {
    events: u64,
    active_today: bool,
}

pub fn conversation_metrics(events: &[Event], now: DateTime<Utc>) -> ConversationMetrics {
    let today = now.date_naive();
    let mut conversations: HashMap<&str, Conversation> = HashMap::new();
    let mut invoked = 0u64;
    let mut errors = 0u64;

    for event in events {
        match event.kind() {
            Some(EventType::Invoked) => invoked += 1,
            Some(EventType::Error) => errors += 1,
            _ => {}
        }

        if let Some(user) = event.user_hash.as_deref() {
            let conversation = conversations.entry(user).or_default();
            conversation.events += 1;
            conversation.active_today |= event.timestamp_utc().date_naive() == today;
        }
    }

    let mut size_distribution: Vec<SizeBucket> = SIZE_BUCKETS
        .iter()
        .map(|(label, _, _)| SizeBucket { bucket: *label, count: 0 })
        .collect();

    for conversation in conversations.values() {
        if let Some(idx) = SIZE_BUCKETS
            .iter()
            .position(|(_, min, max)| (*min..=*max).contains(&conversation.events))
        {
            size_distribution[idx].count += 1;
        }
    }

    let total_conversations = conversations.len() as u64;
    let conversation_events: u64 = conversations.values().map(|c| c.events).sum();
    let single = size_distribution[0].count;

    ConversationMetrics {
        total_conversations,
        total_messages: invoked,
        avg_events_per_conversation: if total_conversations == 0 {
            0.0
        } else {
            round2(conversation_events as f64 / total_conversations as f64)
        },
        single_event_pct: ratio_pct(single, total_conversations),
        active_today: conversations.values().filter(|c| c.active_today).count() as u64,
        total_errors: errors,
        error_rate: ratio_pct(errors, invoked),
        size_distribution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::fixtures::event;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 14, 18, 0, 0).unwrap()
    }

    fn bucket(metrics: &ConversationMetrics, label: &str) -> u64 {
        metrics
            .size_distribution
            .iter()
            .find(|b| b.bucket == label)
            .map(|b| b.count)
            .unwrap()
    }

    #[test]
    fn test_single_user_flow() {
        let t = now() - Duration::hours(1);
        let events = vec![
            event(EventType::Invoked, Some("u1"), t),
            event(EventType::Completed, Some("u1"), t + Duration::seconds(1)),
            event(EventType::Invoked, Some("u1"), t + Duration::seconds(2)),
            event(EventType::Error, Some("u1"), t + Duration::seconds(3)),
        ];

        let metrics = conversation_metrics(&events, now());
        assert_eq!(metrics.total_conversations, 1);
        assert_eq!(metrics.total_messages, 2);
        assert_eq!(metrics.total_errors, 1);
        assert_eq!(metrics.error_rate, 50.0);
        assert_eq!(metrics.avg_events_per_conversation, 4.0);
        assert_eq!(metrics.active_today, 1);
        assert_eq!(bucket(&metrics, "2-5"), 1);
    }

    #[test]
    fn test_bucket_edges() {
        let t = now() - Duration::days(3);
        let mut events = vec![event(EventType::Invoked, Some("one"), t)];
        for i in 0..21 {
            events.push(event(EventType::Invoked, Some("many"), t + Duration::seconds(i)));
        }
        for i in 0..20 {
            events.push(event(EventType::Invoked, Some("twenty"), t + Duration::seconds(i)));
        }

        let metrics = conversation_metrics(&events, now());
        assert_eq!(bucket(&metrics, "1"), 1);
        assert_eq!(bucket(&metrics, "11-20"), 1);
        assert_eq!(bucket(&metrics, "20+"), 1);
        assert_eq!(metrics.active_today, 0);
        assert_eq!(metrics.single_event_pct, 33.33);

        let sum: u64 = metrics.size_distribution.iter().map(|b| b.count).sum();
        assert_eq!(sum, metrics.total_conversations);
    }

    #[test]
    fn test_anonymous_events_are_not_conversations() {
        let events = vec![
            event(EventType::Invoked, None, now()),
            event(EventType::Error, None, now()),
        ];

        let metrics = conversation_metrics(&events, now());
        assert_eq!(metrics.total_conversations, 0);
        assert_eq!(metrics.total_messages, 1);
        assert_eq!(metrics.error_rate, 100.0);
        assert_eq!(metrics.avg_events_per_conversation, 0.0);
    }

    #[test]
    fn test_empty_window_is_zeroed() {
        let metrics = conversation_metrics(&[], now());
        assert_eq!(metrics.total_conversations, 0);
        assert_eq!(metrics.error_rate, 0.0);
        assert_eq!(metrics.size_distribution.len(), 5);
    }
}
