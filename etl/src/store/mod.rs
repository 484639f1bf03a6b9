//! Relational store access.
//!
//! - [`schema`] - the target schema as data
//! - [`Store`] - the seam between the loader and a concrete database
//! - [`sqlite`] - SQLite backend
//! - [`loader`] - batched, parent-first bulk loading over any [`Store`]

pub mod loader;
pub mod schema;
pub mod sqlite;

pub use loader::{BulkLoader, LoadSummary};
pub use schema::{property_schema, table_schema, TableSchema};
pub use sqlite::SqliteStore;

use crate::error::StoreResult;
use crate::models::{FactRow, TableName};

/// A relational store the bulk loader can write to.
pub trait Store {
    /// Drop the given tables if present and create them again, children
    /// dropped first and parents created first.
    fn reset_schema(&mut self, schemas: &[TableSchema]) -> StoreResult<()>;

    /// Insert `rows` into one table as a single atomic batch.
    ///
    /// Returns the number of rows written. On error nothing from the batch
    /// is kept.
    fn insert_batch(&mut self, schema: &TableSchema, rows: &[FactRow]) -> StoreResult<usize>;

    fn count_rows(&self, table: TableName) -> StoreResult<u64>;

    /// Upper bound of bind parameters in one statement.
    fn max_bind_params(&self) -> usize;
}
