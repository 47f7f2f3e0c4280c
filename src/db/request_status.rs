//! Database queries for request status records.

use sea_orm::sea_query::OnConflict;
use sea_orm::{EntityTrait, Set};
use uuid::Uuid;

use crate::entity::request_status::{self, ActiveModel, Entity as RequestStatusEntity};
use crate::error::{AppError, AppResult};
use crate::models::{RequestStatus, RequestStatusRecord};

use super::DbPool;

impl From<&RequestStatusRecord> for ActiveModel {
    fn from(record: &RequestStatusRecord) -> Self {
        ActiveModel {
            id: Set(record.id),
            status: Set(record.status.as_str().to_string()),
            error_code: Set(record.error_code.clone()),
            error_detail: Set(record.error_detail.clone()),
            duplicate: Set(record.duplicate),
            created_at: Set(record.created_at),
            updated_at: Set(record.updated_at),
        }
    }
}

impl TryFrom<request_status::Model> for RequestStatusRecord {
    type Error = AppError;

    fn try_from(model: request_status::Model) -> Result<Self, Self::Error> {
        let status = RequestStatus::parse(&model.status).ok_or_else(|| {
            AppError::Database(format!(
                "Request {} has unknown status '{}'",
                model.id, model.status
            ))
        })?;

        Ok(RequestStatusRecord {
            id: model.id,
            status,
            error_code: model.error_code,
            error_detail: model.error_detail,
            duplicate: model.duplicate,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

impl DbPool {
    /// Insert or update a request status record keyed by id.
    pub async fn upsert_request_status(&self, record: &RequestStatusRecord) -> AppResult<()> {
        RequestStatusEntity::insert(ActiveModel::from(record))
            .on_conflict(
                OnConflict::column(request_status::Column::Id)
                    .update_columns([
                        request_status::Column::Status,
                        request_status::Column::ErrorCode,
                        request_status::Column::ErrorDetail,
                        request_status::Column::Duplicate,
                        request_status::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.connection())
            .await
            .map_err(|e| {
                AppError::Database(format!(
                    "Failed to upsert status for request {}: {}",
                    record.id, e
                ))
            })?;

        Ok(())
    }

    /// Get a request status record by id.
    pub async fn get_request_status(&self, id: Uuid) -> AppResult<Option<RequestStatusRecord>> {
        let model = RequestStatusEntity::find_by_id(id)
            .one(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to get request status: {}", e)))?;

        model.map(RequestStatusRecord::try_from).transpose()
    }
}
