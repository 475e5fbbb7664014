//! Traffic source breakdown from `properties.source`

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use super::ratio_pct;
use crate::db::models::{Event, EventType};

/// Source label for events that do not name one
pub const DIRECT_SOURCE: &str = "direct";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBreakdown {
    pub source: String,
    pub events: u64,
    pub users: u64,
    pub conversions: u64,
    pub conversion_rate: f64,
}

#[derive(Default)]
struct Tally<'a> {
    first_seen: usize,
    events: u64,
    invoked: u64,
    conversions: u64,
    users: HashSet<&'a str>,
}

fn source_of(event: &Event) -> &str {
    event
        .properties
        .get("source")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DIRECT_SOURCE)
}

/// Sources ordered by event count, ties in first-appearance order
pub fn traffic_sources(events: &[Event]) -> Vec<SourceBreakdown> {
    let mut tallies: HashMap<&str, Tally> = HashMap::new();

    for event in events {
        let next = tallies.len();
        let tally = tallies.entry(source_of(event)).or_insert_with(|| Tally {
            first_seen: next,
            ..Tally::default()
        });

        tally.events += 1;
        match event.kind() {
            Some(EventType::Invoked) => tally.invoked += 1,
            Some(EventType::Converted) => tally.conversions += 1,
            _ => {}
        }
        if let Some(user) = event.user_hash.as_deref() {
            tally.users.insert(user);
        }
    }

    let mut ranked: Vec<(&str, Tally)> = tallies.into_iter().collect();
    ranked.sort_by_key(|(_, t)| t.first_seen);
    ranked.sort_by(|a, b| b.1.events.cmp(&a.1.events));

    ranked
        .into_iter()
        .map(|(source, t)| SourceBreakdown {
            source: source.to_string(),
            events: t.events,
            users: t.users.len() as u64,
            conversions: t.conversions,
            conversion_rate: ratio_pct(t.conversions, t.invoked),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::fixtures::event;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn test_sources_default_to_direct() {
        let t = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut tagged = event(EventType::Invoked, Some("a"), t);
        tagged.properties = json!({"source": "twitter"});
        let mut converted = event(EventType::Converted, Some("a"), t);
        converted.properties = json!({"source": "twitter"});
        let mut numeric = event(EventType::Invoked, Some("b"), t);
        numeric.properties = json!({"source": 42});

        let events = vec![
            event(EventType::Invoked, Some("c"), t),
            tagged,
            converted,
            numeric,
            event(EventType::Invoked, None, t),
        ];

        let sources = traffic_sources(&events);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].source, DIRECT_SOURCE);
        assert_eq!((sources[0].events, sources[0].users), (3, 2));
        assert_eq!(sources[1].source, "twitter");
        assert_eq!(sources[1].conversion_rate, 100.0);
    }
}
