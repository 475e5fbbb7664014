//! Subscription plans and the feature gate

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Subscription plan of an org
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Pro,
    Team,
}

/// Gated product features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Benchmarks,
    CsvExport,
    UnlimitedApps,
}

impl Plan {
    /// Every plan, cheapest first
    pub const ALL: [Plan; 3] = [Plan::Free, Plan::Pro, Plan::Team];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
            Plan::Team => "team",
        }
    }

    /// Whether this plan may use a feature
    pub const fn allows(&self, feature: Feature) -> bool {
        match (self, feature) {
            (Plan::Free, _) => false,
            (Plan::Pro, Feature::Benchmarks) => true,
            (Plan::Pro, Feature::CsvExport) => true,
            (Plan::Pro, Feature::UnlimitedApps) => false,
            (Plan::Team, _) => true,
        }
    }

    /// Days of event history kept when nothing else is configured
    pub const fn default_retention_days(&self) -> u32 {
        match self {
            Plan::Free => 7,
            Plan::Pro => 90,
            Plan::Team => 180,
        }
    }
}

impl Feature {
    pub const ALL: [Feature; 3] = [Feature::Benchmarks, Feature::CsvExport, Feature::UnlimitedApps];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Feature::Benchmarks => "benchmarks",
            Feature::CsvExport => "csv_export",
            Feature::UnlimitedApps => "unlimited_apps",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = PlanParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "free" => Ok(Plan::Free),
            "pro" => Ok(Plan::Pro),
            "team" => Ok(Plan::Team),
            _ => Err(PlanParseError(s.to_string())),
        }
    }
}

/// Error parsing a plan string
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid plan: {0}")]
pub struct PlanParseError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_plan_has_no_gated_features() {
        for feature in Feature::ALL {
            assert!(!Plan::Free.allows(feature));
        }
    }

    #[test]
    fn test_pro_plan_features() {
        assert!(Plan::Pro.allows(Feature::Benchmarks));
        assert!(Plan::Pro.allows(Feature::CsvExport));
        assert!(!Plan::Pro.allows(Feature::UnlimitedApps));
    }

    #[test]
    fn test_team_plan_has_everything() {
        for feature in Feature::ALL {
            assert!(Plan::Team.allows(feature));
        }
    }

    #[test]
    fn test_plan_parsing() {
        assert_eq!("PRO".parse::<Plan>().unwrap(), Plan::Pro);
        assert_eq!(Plan::Team.to_string(), "team");
        assert!("enterprise".parse::<Plan>().is_err());
    }
}
