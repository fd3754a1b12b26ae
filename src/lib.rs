//! # Larder - typed persistence for nutrition data
//!
//! Larder sits between domain entities (foods, servings, nutrients, meals)
//! and a SQLite store.
//!
//! Larder provides:
//! - A validated table/column schema model and a freezable row container
//! - Entity factories that enforce id invariants per object source
//! - A query builder with transparent IN-list splitting and tiered string search
//! - Batch resolution of natural-key foreign key references
//! - A read-through cache with relationship-aware invalidation

pub mod value;
pub mod schema;
pub mod row;
pub mod entity;
pub mod storage;
pub mod query;
pub mod resolve;
pub mod cache;
pub mod io;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use value::{ColumnType, Value};
pub use schema::{Col, Column, Table};
pub use row::{RowData, NO_ID};
pub use entity::{Entity, ObjectSource, Record};
pub use storage::{Database, Executor};
pub use query::QueryBuilder;
pub use cache::DataSource;

/// Result type alias for Larder operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Larder operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failure reported by the SQL engine
    #[error("Storage error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// A raw value could not be cast to the column's declared type
    #[error("Type error: {0}")]
    Type(String),

    /// Bad table or column definition, or reference to an unknown column
    #[error("Schema error: {0}")]
    Schema(String),

    /// Broken invariant: id/source mismatch, unresolved foreign key, frozen row edit
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Malformed query builder usage
    #[error("Query error: {0}")]
    Query(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
