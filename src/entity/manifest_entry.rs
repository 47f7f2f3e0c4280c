//! ManifestEntry entity for SeaORM.
//!
//! The full entry lives in `document`; the lookup fields are copied into
//! indexed columns.

use sea_orm::entity::prelude::*;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "manifest_entries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub parent_package_name: String,
    pub universal_uuid: String,
    pub file_name: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub document: JsonValue,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
