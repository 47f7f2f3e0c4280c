//! SeaORM entity definitions for PostgreSQL database.

pub mod manifest_entry;
pub mod request_status;
