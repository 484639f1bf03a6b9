//! # Home ETL - property records to a relational store
//!
//! Home ETL takes a batch of denormalized, loosely typed property records
//! (JSON), repairs and validates them, splits the nested valuation, HOA and
//! rehab groups into child tables, and bulk loads everything into SQLite.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  JSON File  │────▶│   Repair    │────▶│  Validate   │────▶│ Denormalize │
//! │ (malformed) │     │  + Parse    │     │ (normalize) │     │ (4 tables)  │
//! └─────────────┘     └─────────────┘     └─────────────┘     └──────┬──────┘
//!                                                                    │
//!                                                             ┌──────▼──────┐
//!                                                             │ Bulk Loader │
//!                                                             │  (SQLite)   │
//!                                                             └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use home_etl::{read_input, Pipeline, PipelineOptions, SqliteStore};
//!
//! let input = read_input("data/properties.json")?;
//! let mut store = SqliteStore::open_in_memory()?;
//! let summary = Pipeline::new(PipelineOptions::default()).run(&input, &mut store)?;
//! summary.log();
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`config`] - Environment configuration
//! - [`logs`] - Logging setup and helpers
//! - [`models`] - Domain models (ValidatedProperty, FactRow, TableRows)
//! - [`parser`] - Input decoding, JSON repair and batch parsing
//! - [`transform`] - Normalization, denormalization, and pipeline
//! - [`validation`] - Record validation
//! - [`store`] - Declarative schema, SQLite store, bulk loader

// Core modules
pub mod config;
pub mod error;
pub mod logs;
pub mod models;

// Parsing
pub mod parser;

// Transformation
pub mod transform;

// Validation
pub mod validation;

// Storage
pub mod store;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError,
    ElementCause,
    InputError,
    LoadError,
    ParseError,
    PipelineError,
    RejectionCause,
    StoreError,
};

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::{EtlConfig, StoreConfig};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    FactRow,
    Flag,
    HoaFee,
    RehabAssessment,
    SqlValue,
    TableName,
    TableRows,
    ValidatedProperty,
    Valuation,
};

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use parser::{
    decode_content,
    detect_encoding,
    parse_batch,
    read_input,
    repair,
    repair_and_parse,
    Fix,
    Repaired,
};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{
    ElementRejection,
    Group,
    RecordRejection,
    RecordValidator,
    ValidatedRecord,
};

// =============================================================================
// Re-exports - Transformation
// =============================================================================

pub use transform::{
    collect_dimensions,
    denormalize,
    denormalize_all,
    normalize_flag,
    normalize_integer,
    normalize_numeric,
    normalize_text,
    DimensionCounts,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{
    Extraction,
    Pipeline,
    PipelineOptions,
    RunSummary,
    Stage,
};

// =============================================================================
// Re-exports - Store
// =============================================================================

pub use store::{
    property_schema,
    sqlite::render_ddl,
    BulkLoader,
    LoadSummary,
    SqliteStore,
    Store,
    TableSchema,
};
