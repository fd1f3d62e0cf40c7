use sea_orm::entity::prelude::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A live canvas session. The id is shared with the library session it was provisioned from.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sessions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub session_id: i64,
    #[sea_orm(unique)]
    pub host_token: String,
    #[sea_orm(unique)]
    pub user_token: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: String,
    pub host_guid_hash: Option<String>,
    pub album_id: Option<i32>,
    pub category_id: Option<i32>,
    pub scheduled_date: Option<String>,
    pub scheduled_time: Option<String>,
    pub scheduled_duration: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::participant::Entity")]
    Participant,
    #[sea_orm(has_many = "super::session_data::Entity")]
    SessionData,
    #[sea_orm(has_many = "super::session_asset::Entity")]
    SessionAsset,
}

impl Related<super::participant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Participant.def()
    }
}

impl Related<super::session_data::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SessionData.def()
    }
}

impl Related<super::session_asset::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SessionAsset.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
