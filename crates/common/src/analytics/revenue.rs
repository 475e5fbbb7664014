//! Revenue attributed through `converted` events
//!
//! Amounts are never summed across currencies; each currency gets its own
//! line.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use super::{mean, round2};
use crate::db::models::Event;

/// Currency assumed when a revenue-bearing event carries none
pub const DEFAULT_CURRENCY: &str = "USD";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyRevenue {
    pub currency: String,
    pub total: f64,
    pub transactions: u64,
    pub average: f64,
    pub paying_users: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueReport {
    pub transactions: u64,
    pub paying_users: u64,
    pub by_currency: Vec<CurrencyRevenue>,
}

#[derive(Default)]
struct Tally<'a> {
    total: f64,
    transactions: u64,
    users: HashSet<&'a str>,
}

/// Revenue per currency, ordered by currency code
pub fn revenue_report(events: &[Event]) -> RevenueReport {
    let mut by_currency: BTreeMap<&str, Tally> = BTreeMap::new();
    let mut paying = HashSet::new();
    let mut transactions = 0u64;

    for event in events {
        let Some(amount) = event.revenue.filter(|a| a.is_finite() && *a >= 0.0) else {
            continue;
        };
        let currency = event.currency.as_deref().unwrap_or(DEFAULT_CURRENCY);
        let tally = by_currency.entry(currency).or_default();
        tally.total += amount;
        tally.transactions += 1;
        transactions += 1;

        if let Some(user) = event.user_hash.as_deref() {
            tally.users.insert(user);
            paying.insert(user);
        }
    }

    RevenueReport {
        transactions,
        paying_users: paying.len() as u64,
        by_currency: by_currency
            .into_iter()
            .map(|(currency, tally)| CurrencyRevenue {
                currency: currency.to_string(),
                total: round2(tally.total),
                transactions: tally.transactions,
                average: mean(tally.total, tally.transactions),
                paying_users: tally.users.len() as u64,
            })
            .collect(),
    }
}
