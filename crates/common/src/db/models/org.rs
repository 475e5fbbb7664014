//! Org entity (tenancy and billing boundary)

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::plans::Plan;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orgs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub name: String,

    /// free | pro | team, driven by payment-provider webhooks
    #[sea_orm(column_type = "Text")]
    pub plan: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub stripe_customer_id: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub stripe_subscription_id: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub subscription_status: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Parsed plan. Unknown values fall back to the free plan.
    pub fn plan(&self) -> Plan {
        self.plan.parse().unwrap_or(Plan::Free)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::app::Entity")]
    Apps,

    #[sea_orm(has_many = "super::org_member::Entity")]
    Members,
}

impl Related<super::app::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Apps.def()
    }
}

impl Related<super::org_member::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Members.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
