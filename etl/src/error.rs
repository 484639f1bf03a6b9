//! Error types for the property ETL pipeline.
//!
//! Errors are layered the same way the pipeline is:
//!
//! - [`InputError`] - reading and decoding the input file
//! - [`ParseError`] - the batch could not be parsed even after repair
//! - [`RejectionCause`] / [`ElementCause`] - why a record or nested element was dropped
//! - [`StoreError`] - failures reported by the relational store
//! - [`LoadError`] - bulk load failures, with table and batch context
//! - [`ConfigError`] - invalid configuration values
//! - [`PipelineError`] - top-level orchestration errors
//!
//! Field coercion failures are not errors: they degrade to null and are only
//! counted. Record and element rejections are values, not `Err`s, unless the
//! run is configured to stop on the first invalid record.

use serde::Serialize;
use thiserror::Error;

use crate::models::TableName;
use crate::transform::pipeline::Stage;
use crate::validation::RecordRejection;

// =============================================================================
// Input Errors
// =============================================================================

/// Errors while reading the raw input batch.
#[derive(Debug, Error)]
pub enum InputError {
    /// Failed to read the file.
    #[error("Failed to read input: {0}")]
    Io(#[from] std::io::Error),

    /// The bytes could not be decoded with the detected encoding.
    #[error("Failed to decode input as {encoding}: {message}")]
    Encoding { encoding: String, message: String },
}

// =============================================================================
// Batch Parse Errors
// =============================================================================

/// The repaired input is still not valid JSON, or has the wrong top-level shape.
///
/// There is no per-record boundary before parsing succeeds, so this is fatal
/// for the whole batch.
#[derive(Debug, Clone, Error)]
#[error("Invalid JSON at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
    /// A few lines around the failure, the failing line marked with `>>>`.
    pub context: String,
}

// =============================================================================
// Rejection Causes
// =============================================================================

/// Why a whole record was rejected.
#[derive(Debug, Clone, Error, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionCause {
    /// The record does not have the expected structural shape.
    #[error("invalid record shape: {}", errors.join("; "))]
    Shape { errors: Vec<String> },

    /// `Property_Title` is absent, null, or blank.
    #[error("missing or empty natural identifier (Property_Title)")]
    MissingIdentifier,

    /// Another record in this batch already used the identifier.
    #[error("duplicate natural identifier '{identifier}' (first seen at record {first_position})")]
    DuplicateIdentifier {
        identifier: String,
        first_position: usize,
    },
}

/// Why a single element of a repeating group was dropped.
#[derive(Debug, Clone, Error, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ElementCause {
    /// The element is not a JSON object.
    #[error("element is not an object")]
    NotAnObject,

    /// A structurally required flag is missing or is not YES/NO.
    #[error("required flag '{field}' is missing or not YES/NO")]
    MissingFlag { field: String },
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors reported by a relational store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Any SQLite failure other than a timeout.
    #[error("SQLite error: {0}")]
    Sqlite(#[source] rusqlite::Error),

    /// The store gave up waiting for a lock or statement.
    #[error("Store timed out: {0}")]
    Timeout(String),

    /// A row carries a column the target table does not define.
    #[error("Column '{column}' is not part of table '{table}'")]
    UnknownColumn { table: TableName, column: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(
                    e.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                StoreError::Timeout(err.to_string())
            }
            _ => StoreError::Sqlite(err),
        }
    }
}

// =============================================================================
// Load Errors
// =============================================================================

/// Bulk load failures. Always fatal for the run.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Dropping or recreating the schema failed.
    #[error("Schema reset failed: {0}")]
    Schema(#[source] StoreError),

    /// One insert batch failed and was rolled back.
    #[error("Insert into '{table}' failed at batch {batch} ({rows} rows): {source}")]
    Batch {
        table: TableName,
        batch: usize,
        rows: usize,
        #[source]
        source: StoreError,
    },

    /// Counting rows after the load failed.
    #[error("Counting rows of '{table}' failed: {source}")]
    Count {
        table: TableName,
        #[source]
        source: StoreError,
    },

    /// The store holds a different number of rows than were inserted.
    #[error("Row count mismatch for '{table}': inserted {inserted}, store reports {stored}")]
    CountMismatch {
        table: TableName,
        inserted: u64,
        stored: u64,
    },
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Invalid configuration values from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}' ({expected})")]
    InvalidValue {
        key: String,
        value: String,
        expected: &'static str,
    },
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline errors. Every variant aborts the run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The input could not be read or decoded.
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    /// The batch could not be parsed after repair.
    #[error("Batch parse failed: {0}")]
    Parse(#[from] ParseError),

    /// The bulk load failed.
    #[error("Load failed: {0}")]
    Load(#[from] LoadError),

    /// A record was rejected while skip-invalid is disabled.
    #[error("Record rejected with skip-invalid disabled: {0}")]
    Rejected(RecordRejection),

    /// The batch holds no records.
    #[error("No records to process")]
    EmptyInput,

    /// Every record in the batch was rejected.
    #[error("All {0} records failed validation")]
    AllInvalid(usize),
}

impl PipelineError {
    /// The stage the run was in when this error aborted it.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Load(_) => Stage::Loading,
            PipelineError::Input(_)
            | PipelineError::Parse(_)
            | PipelineError::Rejected(_)
            | PipelineError::EmptyInput
            | PipelineError::AllInvalid(_) => Stage::Extracting,
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for input operations.
pub type InputResult<T> = Result<T, InputError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for load operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
