//! SQLite backend for [`Store`].

use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection};
use std::time::Duration;

use super::schema::{Column, ColumnType, TableSchema};
use super::Store;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::models::{FactRow, SqlValue, TableName};

/// `SQLITE_MAX_VARIABLE_NUMBER` of the bundled library.
const SQLITE_MAX_BIND_PARAMS: usize = 32_766;

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            SqlValue::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            SqlValue::Real(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// A SQLite connection with foreign keys enforced.
///
/// The connection is closed when the store is dropped.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database file named in `config`.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let conn = Connection::open(&config.path)?;
        Self::configure(conn, config.busy_timeout_ms)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(conn, StoreConfig::default().busy_timeout_ms)
    }

    fn configure(conn: Connection, busy_timeout_ms: u64) -> StoreResult<Self> {
        conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    /// Borrow the underlying connection, for queries outside the loader.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Store for SqliteStore {
    fn reset_schema(&mut self, schemas: &[TableSchema]) -> StoreResult<()> {
        let tx = self.conn.transaction()?;
        for schema in schemas.iter().rev() {
            tx.execute_batch(&format!("DROP TABLE IF EXISTS {};", schema.table))?;
        }
        for schema in schemas {
            tx.execute_batch(&table_ddl(schema))?;
        }
        tx.commit()?;
        Ok(())
    }

    fn insert_batch(&mut self, schema: &TableSchema, rows: &[FactRow]) -> StoreResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        for row in rows {
            if let Some(column) = row.columns().find(|c| schema.column(c).is_none()) {
                return Err(StoreError::UnknownColumn {
                    table: schema.table,
                    column: column.to_string(),
                });
            }
        }

        let columns: Vec<&'static str> = schema.column_names().collect();
        let rows_per_statement = (self.max_bind_params() / columns.len().max(1)).max(1);
        let null = SqlValue::Null;
        let null = &null;

        let tx = self.conn.transaction()?;
        for chunk in rows.chunks(rows_per_statement) {
            let sql = insert_sql(schema.table, &columns, chunk.len());
            let params = chunk
                .iter()
                .flat_map(|row| columns.iter().map(move |c| row.get(c).unwrap_or(null)));
            tx.execute(&sql, params_from_iter(params))?;
        }
        tx.commit()?;

        Ok(rows.len())
    }

    fn count_rows(&self, table: TableName) -> StoreResult<u64> {
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn max_bind_params(&self) -> usize {
        SQLITE_MAX_BIND_PARAMS
    }
}

// =============================================================================
// DDL rendering
// =============================================================================

fn column_ddl(column: &Column) -> String {
    let mut ddl = format!("{} ", column.name);
    ddl.push_str(match column.ty {
        ColumnType::Integer => "INTEGER",
        ColumnType::Real => "REAL",
        ColumnType::Text | ColumnType::Flag => "TEXT",
    });
    if !column.nullable {
        ddl.push_str(" NOT NULL");
    }
    if column.unique {
        ddl.push_str(" UNIQUE");
    }
    if column.ty == ColumnType::Flag {
        ddl.push_str(&format!(" CHECK ({} IN ('YES', 'NO'))", column.name));
    }
    ddl
}

/// `CREATE TABLE` statement for one table.
pub fn create_table_sql(schema: &TableSchema) -> String {
    let mut lines = vec![format!("    {} INTEGER PRIMARY KEY AUTOINCREMENT", schema.primary_key)];
    lines.extend(schema.columns.iter().map(|c| format!("    {}", column_ddl(c))));
    if let Some(fk) = &schema.foreign_key {
        let mut line = format!(
            "    FOREIGN KEY ({}) REFERENCES {}({})",
            fk.column, fk.references, fk.referenced_column
        );
        if fk.on_delete_cascade {
            line.push_str(" ON DELETE CASCADE");
        }
        lines.push(line);
    }
    format!("CREATE TABLE {} (\n{}\n);", schema.table, lines.join(",\n"))
}

/// `CREATE TABLE` plus its `CREATE INDEX` statements.
fn table_ddl(schema: &TableSchema) -> String {
    let mut ddl = create_table_sql(schema);
    for index in &schema.indexes {
        ddl.push_str(&format!(
            "\nCREATE {}INDEX {} ON {}({});",
            if index.unique { "UNIQUE " } else { "" },
            index.name,
            schema.table,
            index.columns.join(", ")
        ));
    }
    ddl
}

/// DDL for all given tables, in order.
pub fn render_ddl(schemas: &[TableSchema]) -> String {
    schemas.iter().map(table_ddl).collect::<Vec<_>>().join("\n\n")
}

fn insert_sql(table: TableName, columns: &[&str], rows: usize) -> String {
    let placeholders = format!("({})", vec!["?"; columns.len()].join(", "));
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        table,
        columns.join(", "),
        vec![placeholders; rows].join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::{property_schema, table_schema};

    fn store() -> SqliteStore {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.reset_schema(&property_schema()).unwrap();
        store
    }

    fn parent(title: &str) -> FactRow {
        FactRow::new(TableName::Properties).with("property_title", title)
    }

    #[test]
    fn test_render_ddl() {
        let ddl = render_ddl(&property_schema());
        assert!(ddl.contains("CREATE TABLE properties ("));
        assert!(ddl.contains("property_title TEXT NOT NULL UNIQUE"));
        assert!(ddl.contains(
            "FOREIGN KEY (property_title) REFERENCES properties(property_title) ON DELETE CASCADE"
        ));
        assert!(ddl.contains("hoa_flag TEXT NOT NULL CHECK (hoa_flag IN ('YES', 'NO'))"));
        assert!(ddl.contains("CREATE INDEX idx_properties_address_zip ON properties(address, zip_code);"));
        assert!(ddl.find("CREATE TABLE properties").unwrap() < ddl.find("CREATE TABLE valuations").unwrap());
    }

    #[test]
    fn test_insert_and_count() {
        let mut store = store();
        let schema = table_schema(TableName::Properties);
        let rows: Vec<_> = (0..5).map(|i| parent(&format!("P{i}"))).collect();

        assert_eq!(store.insert_batch(&schema, &rows).unwrap(), 5);
        assert_eq!(store.count_rows(TableName::Properties).unwrap(), 5);
        assert_eq!(store.insert_batch(&schema, &[]).unwrap(), 0);
    }

    #[test]
    fn test_child_without_parent_fails() {
        let mut store = store();
        let schema = table_schema(TableName::Valuations);
        let orphan = FactRow::new(TableName::Valuations)
            .with("property_title", "Nobody")
            .with("valuation_index", 1usize);

        let err = store.insert_batch(&schema, &[orphan]).unwrap_err();
        assert!(matches!(err, StoreError::Sqlite(_)));
        assert_eq!(store.count_rows(TableName::Valuations).unwrap(), 0);
    }

    #[test]
    fn test_failed_batch_rolls_back() {
        let mut store = store();
        let schema = table_schema(TableName::Properties);
        let rows = vec![parent("A"), parent("B"), parent("A")];

        assert!(store.insert_batch(&schema, &rows).is_err());
        assert_eq!(store.count_rows(TableName::Properties).unwrap(), 0);
    }

    #[test]
    fn test_invalid_flag_rejected_by_check() {
        let mut store = store();
        store
            .insert_batch(&table_schema(TableName::Properties), &[parent("A")])
            .unwrap();
        let bad = FactRow::new(TableName::HoaFees)
            .with("property_title", "A")
            .with("hoa_index", 1usize)
            .with("hoa_flag", "MAYBE");

        assert!(store
            .insert_batch(&table_schema(TableName::HoaFees), &[bad])
            .is_err());
    }

    #[test]
    fn test_unknown_column() {
        let mut store = store();
        let row = parent("A").with("color", "red");
        let err = store
            .insert_batch(&table_schema(TableName::Properties), &[row])
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownColumn { .. }));
    }

    #[test]
    fn test_reset_drops_rows_and_cascade() {
        let mut store = store();
        store
            .insert_batch(&table_schema(TableName::Properties), &[parent("A")])
            .unwrap();
        store.reset_schema(&property_schema()).unwrap();
        for table in TableName::ALL {
            assert_eq!(store.count_rows(table).unwrap(), 0);
        }
    }

    #[test]
    fn test_on_delete_cascade() {
        let mut store = store();
        store
            .insert_batch(&table_schema(TableName::Properties), &[parent("A")])
            .unwrap();
        let child = FactRow::new(TableName::RehabAssessments)
            .with("property_title", "A")
            .with("rehab_index", 1usize);
        store
            .insert_batch(&table_schema(TableName::RehabAssessments), &[child])
            .unwrap();

        store
            .connection()
            .execute("DELETE FROM properties WHERE property_title = 'A'", [])
            .unwrap();
        assert_eq!(store.count_rows(TableName::RehabAssessments).unwrap(), 0);
    }

    #[test]
    fn test_file_backed_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            path: dir.path().join("home.sqlite"),
            busy_timeout_ms: 100,
        };
        {
            let mut store = SqliteStore::open(&config).unwrap();
            store.reset_schema(&property_schema()).unwrap();
            store
                .insert_batch(&table_schema(TableName::Properties), &[parent("A")])
                .unwrap();
        }
        let store = SqliteStore::open(&config).unwrap();
        assert_eq!(store.count_rows(TableName::Properties).unwrap(), 1);
    }
}
