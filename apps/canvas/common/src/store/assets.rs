use super::CanvasStore;
use crate::ServiceError;
use crate::assets::{AssetType, DetectedAsset, detect_assets};
use chrono::{DateTime, Utc};
use entity::session_asset;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::collections::HashMap;
use tracing::info;

impl CanvasStore {
    /// Swaps the session's asset list for `detected`. Selectors that were
    /// already shared keep their `shared_at`.
    pub async fn replace_detected_assets(
        &self,
        session_id: i64,
        detected: &[DetectedAsset],
        created_by: Option<&str>,
    ) -> Result<Vec<session_asset::Model>, ServiceError> {
        let txn = self.db.begin().await?;

        let previously_shared: HashMap<String, DateTime<Utc>> = session_asset::Entity::find()
            .filter(session_asset::Column::SessionId.eq(session_id))
            .all(&txn)
            .await?
            .into_iter()
            .filter_map(|a| a.shared_at.map(|at| (a.asset_selector, at)))
            .collect();

        session_asset::Entity::delete_many()
            .filter(session_asset::Column::SessionId.eq(session_id))
            .exec(&txn)
            .await?;

        let now = Utc::now();
        let mut inserted = Vec::with_capacity(detected.len());
        for asset in detected {
            let model = session_asset::ActiveModel {
                session_id: Set(session_id),
                asset_type: Set(asset.asset_type.as_str().to_string()),
                asset_selector: Set(asset.selector.clone()),
                position: Set(Some(asset.position)),
                css_pattern: Set(Some(asset.css_pattern.to_string())),
                shared_at: Set(previously_shared.get(&asset.selector).copied()),
                is_active: Set(true),
                detected_at: Set(now),
                created_at: Set(now),
                created_by: Set(created_by.map(str::to_string)),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
            inserted.push(model);
        }

        txn.commit().await?;
        info!("Stored {} assets for session {}", inserted.len(), session_id);
        Ok(inserted)
    }

    /// Runs detection over the linked library transcript. Sessions without a transcript get no assets.
    pub async fn sync_assets_from_library(
        &self,
        session_id: i64,
        created_by: Option<&str>,
    ) -> Result<Vec<session_asset::Model>, ServiceError> {
        let transcript = self
            .library_session(session_id)
            .await?
            .and_then(|library| library.transcript)
            .unwrap_or_default();
        let detected = detect_assets(&transcript);
        self.replace_detected_assets(session_id, &detected, created_by)
            .await
    }

    pub async fn assets_for_session(
        &self,
        session_id: i64,
        asset_type: Option<AssetType>,
        shared_only: bool,
    ) -> Result<Vec<session_asset::Model>, ServiceError> {
        let mut query = session_asset::Entity::find()
            .filter(session_asset::Column::SessionId.eq(session_id))
            .filter(session_asset::Column::IsActive.eq(true));
        if let Some(asset_type) = asset_type {
            query = query.filter(session_asset::Column::AssetType.eq(asset_type.as_str()));
        }
        if shared_only {
            query = query.filter(session_asset::Column::SharedAt.is_not_null());
        }
        Ok(query
            .order_by_asc(session_asset::Column::Position)
            .order_by_asc(session_asset::Column::AssetId)
            .all(&self.db)
            .await?)
    }

    pub async fn mark_asset_shared(
        &self,
        session_id: i64,
        selector: &str,
    ) -> Result<Option<session_asset::Model>, ServiceError> {
        let Some(existing) = session_asset::Entity::find()
            .filter(session_asset::Column::SessionId.eq(session_id))
            .filter(session_asset::Column::AssetSelector.eq(selector))
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };
        let mut active: session_asset::ActiveModel = existing.into();
        active.shared_at = Set(Some(Utc::now()));
        Ok(Some(active.update(&self.db).await?))
    }
}
