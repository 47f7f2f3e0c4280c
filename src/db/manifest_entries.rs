//! Database queries for manifest entries.

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait};
use uuid::Uuid;

use crate::entity::manifest_entry::{self, ActiveModel, Entity as ManifestEntryEntity};
use crate::error::{AppError, AppResult};
use crate::models::{ManifestEntry, ManifestField};

use super::DbPool;

fn column_for(field: ManifestField) -> manifest_entry::Column {
    match field {
        ManifestField::ParentPackageName => manifest_entry::Column::ParentPackageName,
        ManifestField::UniversalUuid => manifest_entry::Column::UniversalUuid,
        ManifestField::FileName => manifest_entry::Column::FileName,
    }
}

fn to_active_model(entry: &ManifestEntry) -> AppResult<ActiveModel> {
    let document = serde_json::to_value(entry)
        .map_err(|e| AppError::Database(format!("Failed to encode manifest entry: {}", e)))?;

    Ok(ActiveModel {
        id: Set(Uuid::now_v7()),
        parent_package_name: Set(entry.parent_package_name.clone()),
        universal_uuid: Set(entry.universal_uuid.clone()),
        file_name: Set(entry.file_name.clone()),
        document: Set(document),
        created_at: Set(Utc::now()),
    })
}

impl DbPool {
    /// Find manifest entries by one of the indexed lookup fields.
    pub async fn find_manifest_entries(
        &self,
        field: ManifestField,
        value: &str,
    ) -> AppResult<Vec<ManifestEntry>> {
        let rows = ManifestEntryEntity::find()
            .filter(column_for(field).eq(value))
            .all(self.connection())
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to find manifest entries by {}: {}", field, e))
            })?;

        rows.into_iter()
            .map(|row| {
                serde_json::from_value(row.document).map_err(|e| {
                    AppError::Database(format!("Stored manifest entry {} is unreadable: {}", row.id, e))
                })
            })
            .collect()
    }

    /// Delete manifest entries by one of the indexed lookup fields.
    pub async fn delete_manifest_entries(&self, field: ManifestField, value: &str) -> AppResult<u64> {
        let result = ManifestEntryEntity::delete_many()
            .filter(column_for(field).eq(value))
            .exec(self.connection())
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to delete manifest entries by {}: {}", field, e))
            })?;

        Ok(result.rows_affected)
    }

    /// Insert a batch of manifest entries inside one transaction.
    pub async fn insert_manifest_entries(&self, entries: &[ManifestEntry]) -> AppResult<usize> {
        let models = entries
            .iter()
            .map(to_active_model)
            .collect::<AppResult<Vec<_>>>()?;

        let txn = self
            .connection()
            .begin()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        for model in models {
            // Dropping `txn` on error rolls the batch back
            model
                .insert(&txn)
                .await
                .map_err(|e| AppError::Database(format!("Failed to insert manifest entry: {}", e)))?;
        }

        txn.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit manifest entries: {}", e)))?;

        Ok(entries.len())
    }
}
