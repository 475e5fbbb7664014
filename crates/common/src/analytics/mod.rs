//! Dashboard report reducers
//!
//! Every reducer is a pure function over events (or daily counter rows)
//! already fetched for one app and window, plus an explicit `now`. Nothing
//! here touches storage. Percentages are on a 0-100 scale rounded to two
//! decimals.

pub mod benchmark;
pub mod conversations;
pub mod funnel;
pub mod prompts;
pub mod retention;
pub mod revenue;
pub mod sources;
pub mod summary;
pub mod usage;

pub use benchmark::{category_benchmark, AppStats, BenchmarkReport, K_ANONYMITY_FLOOR};
pub use conversations::{conversation_metrics, ConversationMetrics};
pub use funnel::{conversion_funnel, daily_counts_from_events, DailyCounts, FunnelReport};
pub use prompts::{prompt_patterns, PromptPattern};
pub use retention::{retention_report, RetentionReport};
pub use revenue::{revenue_report, RevenueReport};
pub use sources::{traffic_sources, SourceBreakdown};
pub use summary::{event_summary, EventSummary};
pub use usage::{usage_patterns, UsagePatterns};

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `numerator / denominator` as a percentage, 0 when the denominator is 0
pub fn ratio_pct(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    round2(numerator as f64 * 100.0 / denominator as f64)
}

/// Arithmetic mean rounded to two decimals, 0 for an empty sample
pub fn mean(sum: f64, samples: u64) -> f64 {
    if samples == 0 {
        return 0.0;
    }
    round2(sum / samples as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_pct_rounds_and_guards_zero() {
        assert_eq!(ratio_pct(1, 3), 33.33);
        assert_eq!(ratio_pct(2, 3), 66.67);
        assert_eq!(ratio_pct(5, 0), 0.0);
        assert_eq!(ratio_pct(1, 2), 50.0);
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(10.0, 4), 2.5);
        assert_eq!(mean(10.0, 0), 0.0);
    }
}
