//! Invoked -> completed -> converted funnel from the daily counters

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use super::ratio_pct;
use crate::db::models::{DailyMetric, Event, EventType};

/// Funnel counters of one app on one UTC day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyCounts {
    pub date: NaiveDate,
    pub invoked: u64,
    pub completed: u64,
    pub converted: u64,
}

impl DailyCounts {
    fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            invoked: 0,
            completed: 0,
            converted: 0,
        }
    }

    fn absorb(&mut self, other: &DailyCounts) {
        self.invoked += other.invoked;
        self.completed += other.completed;
        self.converted += other.converted;
    }
}

impl From<&DailyMetric> for DailyCounts {
    fn from(row: &DailyMetric) -> Self {
        Self {
            date: row.date,
            invoked: row.invoked.max(0) as u64,
            completed: row.completed.max(0) as u64,
            converted: row.converted.max(0) as u64,
        }
    }
}

/// Rebuild the daily counter cache from raw events, oldest day first
pub fn daily_counts_from_events(events: &[Event]) -> Vec<DailyCounts> {
    let mut days: BTreeMap<NaiveDate, DailyCounts> = BTreeMap::new();

    for event in events {
        let date = event.timestamp_utc().date_naive();
        let Some(kind) = event.kind().filter(EventType::is_funnel_step) else {
            continue;
        };
        let slot = days.entry(date).or_insert_with(|| DailyCounts::empty(date));
        match kind {
            EventType::Invoked => slot.invoked += 1,
            EventType::Completed => slot.completed += 1,
            _ => slot.converted += 1,
        }
    }

    days.into_values().collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelDay {
    pub date: NaiveDate,
    pub invoked: u64,
    pub completed: u64,
    pub converted: u64,
    pub conversion_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunnelReport {
    pub invoked: u64,
    pub completed: u64,
    pub converted: u64,
    pub completion_rate: f64,
    pub conversion_rate: f64,
    pub days: Vec<FunnelDay>,
}

/// Dense per-day funnel for `from..=to`; days without rows are zero
pub fn conversion_funnel(rows: &[DailyCounts], from: NaiveDate, to: NaiveDate) -> FunnelReport {
    let mut by_day: BTreeMap<NaiveDate, DailyCounts> = BTreeMap::new();
    for row in rows.iter().filter(|r| r.date >= from && r.date <= to) {
        by_day
            .entry(row.date)
            .or_insert_with(|| DailyCounts::empty(row.date))
            .absorb(row);
    }

    let mut totals = DailyCounts::empty(from);
    let days: Vec<FunnelDay> = from
        .iter_days()
        .take_while(|date| *date <= to)
        .map(|date| {
            let counts = by_day.get(&date).copied().unwrap_or(DailyCounts::empty(date));
            totals.absorb(&counts);
            FunnelDay {
                date,
                invoked: counts.invoked,
                completed: counts.completed,
                converted: counts.converted,
                conversion_rate: ratio_pct(counts.converted, counts.invoked),
            }
        })
        .collect();

    FunnelReport {
        invoked: totals.invoked,
        completed: totals.completed,
        converted: totals.converted,
        completion_rate: ratio_pct(totals.completed, totals.invoked),
        conversion_rate: ratio_pct(totals.converted, totals.invoked),
        days,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::fixtures::event;
    use chrono::{Duration, TimeZone, Utc};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, d).unwrap()
    }

    #[test]
    fn test_counts_from_events_skip_error_and_custom() {
        let t = Utc.with_ymd_and_hms(2026, 6, 1, 23, 30, 0).unwrap();
        let events = vec![
            event(EventType::Invoked, None, t),
            event(EventType::Error, None, t),
            event(EventType::Custom, None, t),
            event(EventType::Completed, None, t + Duration::hours(1)),
        ];

        let counts = daily_counts_from_events(&events);
        assert_eq!(counts.len(), 2);
        assert_eq!((counts[0].date, counts[0].invoked), (date(1), 1));
        assert_eq!((counts[1].date, counts[1].completed), (date(2), 1));
    }

    #[test]
    fn test_funnel_is_dense_and_totals_add_up() {
        let rows = vec![
            DailyCounts { date: date(2), invoked: 10, completed: 8, converted: 2 },
            DailyCounts { date: date(4), invoked: 10, completed: 4, converted: 3 },
            DailyCounts { date: date(9), invoked: 99, completed: 0, converted: 0 },
        ];

        let report = conversion_funnel(&rows, date(1), date(5));
        assert_eq!(report.days.len(), 5);
        assert_eq!(report.days[0].invoked, 0);
        assert_eq!(report.days[0].conversion_rate, 0.0);
        assert_eq!(report.days[1].conversion_rate, 20.0);
        assert_eq!(report.invoked, 20);
        assert_eq!(report.completion_rate, 60.0);
        assert_eq!(report.conversion_rate, 25.0);
    }
}
