//! Migration: Create request_status table.
//!
//! One row per ingestion request, upserted by id.

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
                CREATE TABLE request_status (
                    id UUID PRIMARY KEY,

                    status VARCHAR(20) NOT NULL DEFAULT 'running'
                        CHECK (status IN ('running', 'completed', 'error')),
                    error_code VARCHAR(64),     -- stable code, set only in error state
                    error_detail TEXT,          -- operator-facing detail
                    duplicate BOOLEAN NOT NULL DEFAULT FALSE,

                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                );

                -- Operators list failed requests by code
                CREATE INDEX idx_request_status_error_code ON request_status(error_code)
                    WHERE error_code IS NOT NULL;
                "#,
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TABLE IF EXISTS request_status CASCADE;")
            .await?;

        Ok(())
    }
}
