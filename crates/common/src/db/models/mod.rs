//! SeaORM entity models
//!
//! Database entities for GPTLens

mod app;
mod daily_metric;
mod event;
mod org;
mod org_member;

pub use org::{
    Entity as OrgEntity,
    Model as Org,
    ActiveModel as OrgActiveModel,
    Column as OrgColumn,
};

pub use org_member::{
    Entity as OrgMemberEntity,
    Model as OrgMember,
    ActiveModel as OrgMemberActiveModel,
    Column as OrgMemberColumn,
};

pub use app::{
    Entity as AppEntity,
    Model as App,
    ActiveModel as AppActiveModel,
    Column as AppColumn,
    AppCategory,
};

pub use event::{
    Entity as EventEntity,
    Model as Event,
    ActiveModel as EventActiveModel,
    Column as EventColumn,
    EventType,
};

pub use daily_metric::{
    Entity as DailyMetricEntity,
    Model as DailyMetric,
    ActiveModel as DailyMetricActiveModel,
    Column as DailyMetricColumn,
};
