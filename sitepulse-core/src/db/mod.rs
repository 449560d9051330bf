//! Database layer for sitepulse
//!
//! Durable storage for the ingestion endpoint using SQLite with:
//! - Schema migrations
//! - A [`crate::ingest::BatchStore`] implementation

pub mod repo;
pub mod schema;

pub use repo::SqliteStore;
