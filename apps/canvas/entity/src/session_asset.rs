use sea_orm::entity::prelude::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "session_assets")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub asset_id: i32,
    pub session_id: i64,
    pub asset_type: String,
    pub asset_selector: String,
    pub position: Option<i32>,
    pub css_pattern: Option<String>,
    pub shared_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub detected_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
}

impl Model {
    pub fn is_shared(&self) -> bool {
        self.shared_at.is_some()
    }

    /// Value of the `data-asset-id` attribute injected into rendered transcripts.
    pub fn data_asset_id(&self) -> String {
        format!("asset-{}", self.asset_id)
    }

    pub fn css_selector(&self) -> String {
        format!("[data-asset-id='{}']", self.data_asset_id())
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::session::Entity",
        from = "Column::SessionId",
        to = "super::session::Column::SessionId",
        on_delete = "Cascade"
    )]
    Session,
}

impl Related<super::session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Session.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
