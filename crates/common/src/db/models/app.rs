//! App entity (one tracked Custom GPT)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of GPT store categories used for benchmarking
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppCategory {
    Productivity,
    Writing,
    Programming,
    Education,
    Research,
    Business,
    Lifestyle,
    Entertainment,
    Other,
}

impl AppCategory {
    pub const fn as_str(&self) -> &'static str {
        match self {
            AppCategory::Productivity => "productivity",
            AppCategory::Writing => "writing",
            AppCategory::Programming => "programming",
            AppCategory::Education => "education",
            AppCategory::Research => "research",
            AppCategory::Business => "business",
            AppCategory::Lifestyle => "lifestyle",
            AppCategory::Entertainment => "entertainment",
            AppCategory::Other => "other",
        }
    }
}

impl fmt::Display for AppCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "productivity" => Ok(AppCategory::Productivity),
            "writing" => Ok(AppCategory::Writing),
            "programming" => Ok(AppCategory::Programming),
            "education" => Ok(AppCategory::Education),
            "research" => Ok(AppCategory::Research),
            "business" => Ok(AppCategory::Business),
            "lifestyle" => Ok(AppCategory::Lifestyle),
            "entertainment" => Ok(AppCategory::Entertainment),
            "other" => Ok(AppCategory::Other),
            other => Err(format!("unknown app category: {}", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "apps")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub org_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub name: String,

    #[sea_orm(column_type = "Text")]
    pub category: String,

    /// SHA-256 of the write key; the key itself is never stored
    #[sea_orm(column_type = "Text", unique)]
    #[serde(skip_serializing)]
    pub write_key_hash: String,

    pub rate_limit_per_sec: i32,

    pub is_active: bool,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// Parsed category. Unknown values are bucketed as `other`.
    pub fn category(&self) -> AppCategory {
        self.category.parse().unwrap_or(AppCategory::Other)
    }

    /// Configured per-second ceiling, clamped at zero
    pub fn rate_limit(&self) -> u32 {
        self.rate_limit_per_sec.max(0) as u32
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::org::Entity",
        from = "Column::OrgId",
        to = "super::org::Column::Id",
        on_delete = "Cascade"
    )]
    Org,

    #[sea_orm(has_many = "super::event::Entity")]
    Events,

    #[sea_orm(has_many = "super::daily_metric::Entity")]
    DailyMetrics,
}

impl Related<super::org::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Org.def()
    }
}

impl Related<super::event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Events.def()
    }
}

impl Related<super::daily_metric::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DailyMetrics.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
