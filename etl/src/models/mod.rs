//! Domain models for the property ETL pipeline.
//!
//! - [`ValidatedProperty`] - canonical parent entity with its repeating groups
//! - [`Valuation`], [`HoaFee`], [`RehabAssessment`] - repeating group entries
//! - [`Flag`] - two-valued YES/NO enum
//! - [`TableName`] - the four target tables, ordered parent first
//! - [`FactRow`] / [`SqlValue`] - flat typed rows handed to the loader
//! - [`TableRows`] - per-table row batches

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// Flag
// =============================================================================

/// A normalized YES/NO value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Flag {
    Yes,
    No,
}

impl Flag {
    /// Persisted representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Flag::Yes => "YES",
            Flag::No => "NO",
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Repeating Groups
// =============================================================================

/// One valuation snapshot of a property.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Valuation {
    pub list_price: Option<f64>,
    pub previous_rent: Option<f64>,
    pub arv: Option<f64>,
    pub rent_zestimate: Option<f64>,
    pub low_fmr: Option<f64>,
    pub high_fmr: Option<f64>,
    pub zestimate: Option<f64>,
    pub expected_rent: Option<f64>,
    pub redfin_value: Option<f64>,
}

/// One HOA fee entry. The flag is required; the amount is not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoaFee {
    pub hoa_amount: Option<f64>,
    pub hoa_flag: Flag,
}

/// One rehab assessment with its condition flags.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RehabAssessment {
    pub underwriting_rehab: Option<f64>,
    pub rehab_calculation: Option<f64>,
    pub paint: Option<String>,
    pub flooring_flag: Option<Flag>,
    pub foundation_flag: Option<Flag>,
    pub roof_flag: Option<Flag>,
    pub hvac_flag: Option<Flag>,
    pub kitchen_flag: Option<Flag>,
    pub bathroom_flag: Option<Flag>,
    pub appliances_flag: Option<Flag>,
    pub windows_flag: Option<Flag>,
    pub landscaping_flag: Option<Flag>,
    pub trashout_flag: Option<Flag>,
}

// =============================================================================
// Validated Property
// =============================================================================

/// A property that passed validation.
///
/// `property_title` is the natural identifier: non-empty, and unique within
/// one batch. The three repeating groups keep their source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidatedProperty {
    // Identity and location
    pub property_title: String,
    pub address: Option<String>,
    pub street_address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    // Structure
    pub property_type: Option<String>,
    pub year_built: Option<i64>,
    pub sqft_total: Option<f64>,
    pub sqft_basement: Option<f64>,
    pub sqft_mu: Option<f64>,
    pub bed: Option<i64>,
    pub bath: Option<f64>,

    // Features
    pub layout: Option<String>,
    pub pool: Option<Flag>,
    pub parking: Option<String>,
    pub basement_yes_no: Option<Flag>,
    pub water: Option<String>,
    pub sewage: Option<String>,
    pub htw: Option<Flag>,
    pub commercial: Option<Flag>,
    pub highway: Option<String>,
    pub train: Option<String>,
    pub flood: Option<String>,
    pub occupancy: Option<String>,

    // Financial
    pub net_yield: Option<f64>,
    pub irr: Option<f64>,
    pub taxes: Option<f64>,
    pub tax_rate: Option<f64>,

    // Market
    pub market: Option<String>,
    pub source: Option<String>,
    pub neighborhood_rating: Option<i64>,
    pub school_average: Option<f64>,
    pub subdivision: Option<String>,

    // Status
    pub reviewed_status: Option<String>,
    pub most_recent_status: Option<String>,
    pub selling_reason: Option<String>,
    pub final_reviewer: Option<String>,
    pub seller_retained_broker: Option<String>,
    pub rent_restricted: Option<Flag>,

    // Repeating groups
    pub valuations: Vec<Valuation>,
    pub hoa_fees: Vec<HoaFee>,
    pub rehab_assessments: Vec<RehabAssessment>,
}

impl ValidatedProperty {
    /// Create a property with only its natural identifier set.
    pub fn new(property_title: impl Into<String>) -> Self {
        Self {
            property_title: property_title.into(),
            ..Default::default()
        }
    }
}

// =============================================================================
// Tables
// =============================================================================

/// Target tables. The derived ordering is the insertion order: parent first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableName {
    Properties,
    Valuations,
    HoaFees,
    RehabAssessments,
}

impl TableName {
    /// All tables, parent first.
    pub const ALL: [TableName; 4] = [
        TableName::Properties,
        TableName::Valuations,
        TableName::HoaFees,
        TableName::RehabAssessments,
    ];

    /// The child tables, each referencing [`TableName::Properties`].
    pub const CHILDREN: [TableName; 3] = [
        TableName::Valuations,
        TableName::HoaFees,
        TableName::RehabAssessments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TableName::Properties => "properties",
            TableName::Valuations => "valuations",
            TableName::HoaFees => "hoa_fees",
            TableName::RehabAssessments => "rehab_assessments",
        }
    }

    pub fn is_parent(&self) -> bool {
        matches!(self, TableName::Properties)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Fact Rows
// =============================================================================

/// A typed scalar ready for insertion.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<usize> for SqlValue {
    fn from(v: usize) -> Self {
        SqlValue::Integer(v as i64)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Flag> for SqlValue {
    fn from(v: Flag) -> Self {
        SqlValue::Text(v.as_str().to_string())
    }
}

impl From<Option<f64>> for SqlValue {
    fn from(v: Option<f64>) -> Self {
        v.map_or(SqlValue::Null, SqlValue::Real)
    }
}

impl From<Option<i64>> for SqlValue {
    fn from(v: Option<i64>) -> Self {
        v.map_or(SqlValue::Null, SqlValue::Integer)
    }
}

impl From<Option<Flag>> for SqlValue {
    fn from(v: Option<Flag>) -> Self {
        v.map_or(SqlValue::Null, SqlValue::from)
    }
}

impl From<&Option<String>> for SqlValue {
    fn from(v: &Option<String>) -> Self {
        v.as_deref().map_or(SqlValue::Null, SqlValue::from)
    }
}

/// One flat row for one table, columns in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactRow {
    table: TableName,
    values: Vec<(&'static str, SqlValue)>,
}

impl FactRow {
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            values: Vec::new(),
        }
    }

    /// Append a column value (builder style).
    pub fn with(mut self, column: &'static str, value: impl Into<SqlValue>) -> Self {
        self.values.push((column, value.into()));
        self
    }

    pub fn table(&self) -> TableName {
        self.table
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.values
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.values.iter().map(|(name, _)| *name)
    }

    pub fn values(&self) -> &[(&'static str, SqlValue)] {
        &self.values
    }
}

// =============================================================================
// Table Rows
// =============================================================================

/// Row batches for every table. All four tables are always present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRows {
    tables: BTreeMap<TableName, Vec<FactRow>>,
}

impl TableRows {
    pub fn new() -> Self {
        Self {
            tables: TableName::ALL.iter().map(|t| (*t, Vec::new())).collect(),
        }
    }

    /// Append a row to its table.
    pub fn push(&mut self, row: FactRow) {
        self.tables.entry(row.table()).or_default().push(row);
    }

    /// Append every row of `other`, keeping per-table order.
    pub fn merge(&mut self, other: TableRows) {
        for (table, rows) in other.tables {
            self.tables.entry(table).or_default().extend(rows);
        }
    }

    pub fn rows(&self, table: TableName) -> &[FactRow] {
        self.tables.get(&table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self, table: TableName) -> usize {
        self.rows(table).len()
    }

    pub fn total(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Row counts per table.
    pub fn counts(&self) -> BTreeMap<TableName, usize> {
        self.tables.iter().map(|(t, rows)| (*t, rows.len())).collect()
    }

    /// Tables with their rows, parent first.
    pub fn iter(&self) -> impl Iterator<Item = (TableName, &[FactRow])> {
        self.tables.iter().map(|(t, rows)| (*t, rows.as_slice()))
    }
}

impl Default for TableRows {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
