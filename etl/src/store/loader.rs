//! Bulk loading of per-table fact rows.
//!
//! The loader owns ordering and batching; the [`Store`] only has to execute
//! one atomic batch at a time. Parent rows are always fully committed before
//! any child row of the same call is sent.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

use super::schema::{property_schema, table_schema};
use super::Store;
use crate::error::{LoadError, LoadResult};
use crate::logs::{log_error, log_info, log_success, log_warning};
use crate::models::{FactRow, SqlValue, TableName, TableRows};

/// What a load wrote.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadSummary {
    pub rows_inserted: BTreeMap<TableName, u64>,
    pub batches: usize,
    /// Parent rows sharing address and zip with an earlier row.
    pub quasi_duplicates: usize,
}

impl Default for LoadSummary {
    fn default() -> Self {
        Self {
            rows_inserted: TableName::ALL.iter().map(|t| (*t, 0)).collect(),
            batches: 0,
            quasi_duplicates: 0,
        }
    }
}

impl LoadSummary {
    pub fn merge(&mut self, other: LoadSummary) {
        for (table, n) in other.rows_inserted {
            *self.rows_inserted.entry(table).or_default() += n;
        }
        self.batches += other.batches;
        self.quasi_duplicates += other.quasi_duplicates;
    }

    pub fn inserted(&self, table: TableName) -> u64 {
        self.rows_inserted.get(&table).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.rows_inserted.values().sum()
    }
}

/// Batched, parent-first loader over any [`Store`].
pub struct BulkLoader<'s, S: Store> {
    store: &'s mut S,
    batch_size: usize,
    seen_addresses: HashSet<(String, String)>,
}

impl<'s, S: Store> BulkLoader<'s, S> {
    /// `batch_size` is the number of rows per transaction (at least 1).
    pub fn new(store: &'s mut S, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            seen_addresses: HashSet::new(),
        }
    }

    /// Drop and recreate all four tables.
    pub fn reset(&mut self) -> LoadResult<()> {
        log_info("Resetting schema (drop + create)...");
        self.store
            .reset_schema(&property_schema())
            .map_err(LoadError::Schema)?;
        self.seen_addresses.clear();
        log_success("Schema ready");
        Ok(())
    }

    /// Insert every table of `rows`, parent table first.
    pub fn insert(&mut self, rows: &TableRows) -> LoadResult<LoadSummary> {
        let mut summary = LoadSummary {
            quasi_duplicates: self.check_quasi_duplicates(rows.rows(TableName::Properties)),
            ..Default::default()
        };

        for (table, table_rows) in rows.iter() {
            let (inserted, batches) = self.insert_batches(table, table_rows)?;
            summary.rows_inserted.insert(table, inserted);
            summary.batches += batches;
        }

        Ok(summary)
    }

    /// Insert rows into a single table, in batches. Returns the rows written.
    pub fn insert_table(&mut self, table: TableName, rows: &[FactRow]) -> LoadResult<u64> {
        self.insert_batches(table, rows).map(|(inserted, _)| inserted)
    }

    /// Reset the schema, then insert.
    pub fn load(&mut self, rows: &TableRows) -> LoadResult<LoadSummary> {
        self.reset()?;
        self.insert(rows)
    }

    /// Check that the store holds exactly what `summary` says was inserted.
    pub fn verify(&self, summary: &LoadSummary) -> LoadResult<()> {
        for (&table, &inserted) in &summary.rows_inserted {
            let stored = self
                .store
                .count_rows(table)
                .map_err(|source| LoadError::Count { table, source })?;
            if stored != inserted {
                return Err(LoadError::CountMismatch {
                    table,
                    inserted,
                    stored,
                });
            }
            debug!(%table, rows = stored, "Row count verified");
        }
        Ok(())
    }

    fn insert_batches(&mut self, table: TableName, rows: &[FactRow]) -> LoadResult<(u64, usize)> {
        if rows.is_empty() {
            return Ok((0, 0));
        }

        let schema = table_schema(table);
        let mut inserted = 0u64;
        let mut batches = 0;

        for (i, batch) in rows.chunks(self.batch_size).enumerate() {
            let n = self.store.insert_batch(&schema, batch).map_err(|source| {
                log_error(format!(
                    "Insert into {} failed at batch {} ({} rows): {}",
                    table,
                    i + 1,
                    batch.len(),
                    source
                ));
                LoadError::Batch {
                    table,
                    batch: i + 1,
                    rows: batch.len(),
                    source,
                }
            })?;
            inserted += n as u64;
            batches += 1;
            debug!(%table, batch = i + 1, rows = n, "Batch committed");
        }

        log_success(format!("Inserted {} rows into {} ({} batches)", inserted, table, batches));
        Ok((inserted, batches))
    }

    /// Warn about parent rows repeating an address + zip pair; they are still inserted.
    fn check_quasi_duplicates(&mut self, parents: &[FactRow]) -> usize {
        let mut duplicates = 0;
        for row in parents {
            let text = |column| row.get(column).and_then(SqlValue::as_text);
            let (Some(address), Some(zip)) = (text("address"), text("zip_code")) else {
                continue;
            };
            if !self.seen_addresses.insert((address.to_string(), zip.to_string())) {
                duplicates += 1;
                log_warning(format!(
                    "Property '{}' shares address '{}' and zip '{}' with an earlier record",
                    text("property_title").unwrap_or("?"),
                    address,
                    zip
                ));
            }
        }
        duplicates
    }
}
