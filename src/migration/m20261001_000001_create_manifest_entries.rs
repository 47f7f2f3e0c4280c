//! Migration: Create manifest_entries table.
//!
//! Stores every ingested manifest entry as a JSONB document, with the fields
//! used for lookups and duplicate detection copied into indexed columns.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(
                r#"
                CREATE TABLE manifest_entries (
                    id UUID PRIMARY KEY, -- UUIDv7 for time-ordered sorting

                    -- Lookup fields, copied from the document
                    parent_package_name VARCHAR(500) NOT NULL,
                    universal_uuid VARCHAR(64) NOT NULL,  -- request id that ingested the entry
                    file_name VARCHAR(500) NOT NULL,

                    -- Full entry including opaque metrics
                    document JSONB NOT NULL,

                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                -- Duplicate detection by package
                CREATE INDEX idx_manifest_entries_parent_package_name
                    ON manifest_entries(parent_package_name);

                CREATE INDEX idx_manifest_entries_universal_uuid
                    ON manifest_entries(universal_uuid);

                CREATE INDEX idx_manifest_entries_file_name
                    ON manifest_entries(file_name);
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS manifest_entries CASCADE;")
            .await?;

        Ok(())
    }
}
