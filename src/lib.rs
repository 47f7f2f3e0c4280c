//! Package ingest server library.
//!
//! Decrypts uploaded asset packages, extracts and validates them, persists
//! their manifest entries and uploads the assets to object storage, tracking
//! each request's status along the way.

pub mod api;
pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod middleware;
pub mod migration;
pub mod models;
pub mod services;
