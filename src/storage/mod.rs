//! Storage Layer - SQLite-backed persistence
//!
//! The SQL execution engine. Everything above it talks to SQLite through the
//! [`Executor`] trait, implemented by [`Database`] and by an open
//! transaction [`Session`]. Engine failures surface as `Error::Sql`.

pub mod schema;
pub mod sqlite;

pub use sqlite::{Database, DbStats, Executor, Session, DEFAULT_IN_CLAUSE_LIMIT};
