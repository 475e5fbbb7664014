//! Weekly cohort retention at Day-1, Day-7 and Day-30
//!
//! A user's cohort is the Monday of the week of their first-ever event, which
//! may predate the fetched window. A user counts as retained at horizon `N`
//! when they were active on some day `d` with `N <= d - first_seen <= 2N`.
//! Users first seen fewer than `N` days ago are left out of that horizon's
//! denominator.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::round2;
use crate::db::models::Event;

pub const HORIZONS: [i64; 3] = [1, 7, 30];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HorizonRetention {
    pub day: i64,
    pub eligible: u64,
    pub retained: u64,
    /// Percentage, `None` when no user is old enough to be measured
    pub rate: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortRetention {
    pub cohort_week: NaiveDate,
    pub users: u64,
    pub horizons: Vec<HorizonRetention>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionReport {
    pub total_users: u64,
    pub overall: Vec<HorizonRetention>,
    pub cohorts: Vec<CohortRetention>,
}

/// Monday of the week containing `date`
pub fn cohort_week(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

#[derive(Default, Clone, Copy)]
struct Tally {
    eligible: u64,
    retained: u64,
}

impl Tally {
    fn into_horizon(self, day: i64) -> HorizonRetention {
        HorizonRetention {
            day,
            eligible: self.eligible,
            retained: self.retained,
            rate: (self.eligible > 0)
                .then(|| round2(self.retained as f64 * 100.0 / self.eligible as f64)),
        }
    }
}

/// `first_seen` holds each user's first-ever event day; users missing from
/// it fall back to their earliest day in `events`.
pub fn retention_report(
    events: &[Event],
    first_seen: &HashMap<String, NaiveDate>,
    now: DateTime<Utc>,
) -> RetentionReport {
    let today = now.date_naive();

    let mut active_days: HashMap<&str, BTreeSet<NaiveDate>> = HashMap::new();
    for event in events {
        if let Some(user) = event.user_hash.as_deref() {
            active_days
                .entry(user)
                .or_default()
                .insert(event.timestamp_utc().date_naive());
        }
    }

    let mut overall = [Tally::default(); HORIZONS.len()];
    let mut cohorts: BTreeMap<NaiveDate, (u64, [Tally; HORIZONS.len()])> = BTreeMap::new();

    for (user, days) in &active_days {
        let Some(&earliest) = days.first() else {
            continue;
        };
        let first_seen = first_seen
            .get(*user)
            .map_or(earliest, |&day| day.min(earliest));
        let age = (today - first_seen).num_days();
        let cohort = cohorts
            .entry(cohort_week(first_seen))
            .or_insert((0, [Tally::default(); HORIZONS.len()]));
        cohort.0 += 1;

        for (idx, horizon) in HORIZONS.iter().enumerate() {
            if age < *horizon {
                continue;
            }
            let window = (first_seen + Duration::days(*horizon))
                ..=(first_seen + Duration::days(horizon * 2));
            let retained = days.range(window).next().is_some();

            for tally in [&mut overall[idx], &mut cohort.1[idx]] {
                tally.eligible += 1;
                tally.retained += retained as u64;
            }
        }
    }

    let horizons = |tallies: [Tally; HORIZONS.len()]| -> Vec<HorizonRetention> {
        HORIZONS
            .iter()
            .zip(tallies)
            .map(|(day, tally)| tally.into_horizon(*day))
            .collect()
    };

    RetentionReport {
        total_users: active_days.len() as u64,
        overall: horizons(overall),
        cohorts: cohorts
            .into_iter()
            .map(|(cohort_week, (users, tallies))| CohortRetention {
                cohort_week,
                users,
                horizons: horizons(tallies),
            })
            .collect(),
    }
}
