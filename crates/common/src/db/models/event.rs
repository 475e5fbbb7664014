//! Event entity - immutable lifecycle facts reported by apps

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle event type
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Invoked,
    Completed,
    Error,
    Converted,
    Custom,
}

impl EventType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EventType::Invoked => "invoked",
            EventType::Completed => "completed",
            EventType::Error => "error",
            EventType::Converted => "converted",
            EventType::Custom => "custom",
        }
    }

    /// Whether the type feeds the daily funnel counters
    pub const fn is_funnel_step(&self) -> bool {
        matches!(self, EventType::Invoked | EventType::Completed | EventType::Converted)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invoked" => Ok(EventType::Invoked),
            "completed" => Ok(EventType::Completed),
            "error" => Ok(EventType::Error),
            "converted" => Ok(EventType::Converted),
            "custom" => Ok(EventType::Custom),
            other => Err(format!("unknown event type: {}", other)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub app_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub event_type: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub event_name: Option<String>,

    /// Opaque client properties
    #[sea_orm(column_type = "JsonBinary")]
    pub properties: Json,

    /// SHA-256 of the prompt text, never the text itself
    #[sea_orm(column_type = "Text", nullable)]
    pub prompt_hash: Option<String>,

    /// SHA-256 of the end-user identifier
    #[sea_orm(column_type = "Text", nullable)]
    pub user_hash: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,

    pub latency_ms: Option<i64>,

    #[sea_orm(column_type = "Double", nullable)]
    pub revenue: Option<f64>,

    #[sea_orm(column_type = "Text", nullable)]
    pub currency: Option<String>,

    pub timestamp: DateTimeWithTimeZone,
}

impl Model {
    /// Parsed event type, `None` for rows written by an unknown client
    pub fn kind(&self) -> Option<EventType> {
        self.event_type.parse().ok()
    }

    pub fn is(&self, kind: EventType) -> bool {
        self.event_type == kind.as_str()
    }

    /// Timestamp normalised to UTC
    pub fn timestamp_utc(&self) -> chrono::DateTime<chrono::Utc> {
        self.timestamp.with_timezone(&chrono::Utc)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::app::Entity",
        from = "Column::AppId",
        to = "super::app::Column::Id",
        on_delete = "Cascade"
    )]
    App,
}

impl Related<super::app::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::App.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
