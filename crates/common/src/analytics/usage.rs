//! Usage patterns by hour of day and by calendar day (UTC)

use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use serde::Serialize;
use std::collections::HashSet;

use crate::db::models::Event;

/// Calendar days in the daily series, ending today
pub const USAGE_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyUsage {
    pub hour: u32,
    pub conversations: u64,
    pub events: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyUsage {
    pub date: NaiveDate,
    pub conversations: u64,
    pub events: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsagePatterns {
    pub hourly: Vec<HourlyUsage>,
    pub daily: Vec<DailyUsage>,
    /// Hour with the most events, `None` when there are none
    pub peak_hour: Option<u32>,
}

#[derive(Default)]
struct Bucket<'a> {
    users: HashSet<&'a str>,
    events: u64,
}

impl<'a> Bucket<'a> {
    fn add(&mut self, event: &'a Event) {
        self.events += 1;
        if let Some(user) = event.user_hash.as_deref() {
            self.users.insert(user);
        }
    }
}

pub fn usage_patterns(events: &[Event], now: DateTime<Utc>) -> UsagePatterns {
    let today = now.date_naive();
    let first_day = today - Duration::days(USAGE_DAYS - 1);

    let mut hours: Vec<Bucket> = (0..24).map(|_| Bucket::default()).collect();
    let mut days: Vec<Bucket> = (0..USAGE_DAYS).map(|_| Bucket::default()).collect();

    for event in events {
        let ts = event.timestamp_utc();
        hours[ts.hour() as usize].add(event);

        let offset = (ts.date_naive() - first_day).num_days();
        if (0..USAGE_DAYS).contains(&offset) {
            days[offset as usize].add(event);
        }
    }

    let peak_hour = hours
        .iter()
        .enumerate()
        .filter(|(_, bucket)| bucket.events > 0)
        // max_by_key keeps the last maximum; reverse so the earliest hour wins ties
        .rev()
        .max_by_key(|(_, bucket)| bucket.events)
        .map(|(hour, _)| hour as u32);

    UsagePatterns {
        hourly: hours
            .iter()
            .enumerate()
            .map(|(hour, bucket)| HourlyUsage {
                hour: hour as u32,
                conversations: bucket.users.len() as u64,
                events: bucket.events,
            })
            .collect(),
        daily: days
            .iter()
            .enumerate()
            .map(|(offset, bucket)| DailyUsage {
                date: first_day + Duration::days(offset as i64),
                conversations: bucket.users.len() as u64,
                events: bucket.events,
            })
            .collect(),
        peak_hour,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::fixtures::event;
    use crate::db::models::EventType;
    use chrono::TimeZone;

    #[test]
    fn test_series_are_dense() {
        let now = Utc.with_ymd_and_hms(2026, 5, 14, 12, 0, 0).unwrap();
        let usage = usage_patterns(&[], now);

        assert_eq!(usage.hourly.len(), 24);
        assert_eq!(usage.daily.len(), USAGE_DAYS as usize);
        assert_eq!(usage.daily.last().unwrap().date, now.date_naive());
        assert_eq!(usage.peak_hour, None);
    }

    #[test]
    fn test_buckets_count_distinct_users() {
        let now = Utc.with_ymd_and_hms(2026, 5, 14, 12, 0, 0).unwrap();
        let nine = Utc.with_ymd_and_hms(2026, 5, 14, 9, 5, 0).unwrap();
        let events = vec![
            event(EventType::Invoked, Some("a"), nine),
            event(EventType::Completed, Some("a"), nine + Duration::minutes(1)),
            event(EventType::Invoked, Some("b"), nine + Duration::minutes(2)),
            event(EventType::Invoked, Some("a"), now - Duration::days(2)),
            event(EventType::Invoked, Some("old"), now - Duration::days(45)),
        ];

        let usage = usage_patterns(&events, now);
        assert_eq!(usage.hourly[9].events, 3);
        assert_eq!(usage.hourly[9].conversations, 2);
        assert_eq!(usage.peak_hour, Some(9));

        let today = usage.daily.last().unwrap();
        assert_eq!((today.events, today.conversations), (3, 2));

        let daily_total: u64 = usage.daily.iter().map(|d| d.events).sum();
        assert_eq!(daily_total, 4);
    }
}
