//! Database schema definitions
//!
//! DDL is generated from the table metadata, so the schema model is the
//! single source of truth for columns, constraints and lookup indexes.

use crate::schema::{self, Table};

/// Pragmas applied to every new connection
pub const CONNECTION_PRAGMAS: &str = "PRAGMA foreign_keys = ON;";

/// CREATE TABLE statement for one table
pub fn create_table(table: &Table) -> String {
    table.create_sql()
}

/// All schema creation statements, tables before indexes
pub fn all_schema_statements() -> Vec<String> {
    let tables = schema::all_tables();
    let mut stmts: Vec<String> = tables.iter().map(|t| create_table(t)).collect();
    stmts.extend(tables.iter().flat_map(|t| t.index_sql()));
    stmts
}
