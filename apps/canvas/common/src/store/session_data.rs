use super::CanvasStore;
use crate::{ServiceError, SessionDataType};
use chrono::Utc;
use entity::session_data;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Select, Set,
};
use serde_json::Value;

/// Result of a change that only the creator of a record may make.
#[derive(Debug, Clone, PartialEq)]
pub enum OwnedChange {
    Applied(session_data::Model),
    NotFound,
    NotOwner,
}

pub(super) async fn insert_row<C: ConnectionTrait>(
    db: &C,
    session_id: i64,
    data_type: SessionDataType,
    content: Value,
    created_by: Option<&str>,
) -> Result<session_data::Model, DbErr> {
    session_data::ActiveModel {
        session_id: Set(session_id),
        data_type: Set(data_type.as_str().to_string()),
        content: Set(content),
        created_by: Set(created_by.map(str::to_string)),
        created_at: Set(Utc::now()),
        is_deleted: Set(false),
        ..Default::default()
    }
    .insert(db)
    .await
}

/// Live rows of one type, oldest first.
pub(super) fn live_rows(session_id: i64, data_type: SessionDataType) -> Select<session_data::Entity> {
    session_data::Entity::find()
        .filter(session_data::Column::SessionId.eq(session_id))
        .filter(session_data::Column::DataType.eq(data_type.as_str()))
        .filter(session_data::Column::IsDeleted.eq(false))
        .order_by_asc(session_data::Column::CreatedAt)
        .order_by_asc(session_data::Column::DataId)
}

impl CanvasStore {
    pub async fn insert_data(
        &self,
        session_id: i64,
        data_type: SessionDataType,
        content: Value,
        created_by: Option<&str>,
    ) -> Result<session_data::Model, ServiceError> {
        Ok(insert_row(&self.db, session_id, data_type, content, created_by).await?)
    }

    pub async fn data_of_type(
        &self,
        session_id: i64,
        data_type: SessionDataType,
    ) -> Result<Vec<session_data::Model>, ServiceError> {
        Ok(live_rows(session_id, data_type).all(&self.db).await?)
    }

    pub async fn find_data(
        &self,
        data_id: i32,
        data_type: SessionDataType,
    ) -> Result<Option<session_data::Model>, ServiceError> {
        Ok(session_data::Entity::find_by_id(data_id)
            .filter(session_data::Column::DataType.eq(data_type.as_str()))
            .filter(session_data::Column::IsDeleted.eq(false))
            .one(&self.db)
            .await?)
    }

    pub(crate) async fn replace_content(
        &self,
        existing: session_data::Model,
        content: Value,
    ) -> Result<session_data::Model, ServiceError> {
        let mut active: session_data::ActiveModel = existing.into();
        active.content = Set(content);
        Ok(active.update(&self.db).await?)
    }

    pub async fn update_owned_data(
        &self,
        data_id: i32,
        data_type: SessionDataType,
        owner: &str,
        content: Value,
    ) -> Result<OwnedChange, ServiceError> {
        let Some(existing) = self.find_data(data_id, data_type).await? else {
            return Ok(OwnedChange::NotFound);
        };
        if existing.created_by.as_deref() != Some(owner) {
            return Ok(OwnedChange::NotOwner);
        }
        Ok(OwnedChange::Applied(self.replace_content(existing, content).await?))
    }

    /// Soft-deletes a record created by `owner`.
    pub async fn remove_owned_data(
        &self,
        data_id: i32,
        data_type: SessionDataType,
        owner: &str,
    ) -> Result<OwnedChange, ServiceError> {
        let Some(existing) = self.find_data(data_id, data_type).await? else {
            return Ok(OwnedChange::NotFound);
        };
        if existing.created_by.as_deref() != Some(owner) {
            return Ok(OwnedChange::NotOwner);
        }
        let mut active: session_data::ActiveModel = existing.into();
        active.is_deleted = Set(true);
        Ok(OwnedChange::Applied(active.update(&self.db).await?))
    }

    pub async fn remove_data_by_creator(
        &self,
        session_id: i64,
        data_type: SessionDataType,
        owner: &str,
    ) -> Result<u64, ServiceError> {
        let result = session_data::Entity::update_many()
            .col_expr(session_data::Column::IsDeleted, Expr::value(true))
            .filter(session_data::Column::SessionId.eq(session_id))
            .filter(session_data::Column::DataType.eq(data_type.as_str()))
            .filter(session_data::Column::CreatedBy.eq(owner))
            .filter(session_data::Column::IsDeleted.eq(false))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}
