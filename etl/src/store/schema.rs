//! Declarative relational schema.
//!
//! Tables, columns, the child → parent foreign key and indexes are plain
//! data here; a [`Store`](super::Store) backend renders them into its own DDL.

use serde::Serialize;

use crate::models::TableName;

/// Column storage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    /// Text restricted to `'YES'` / `'NO'`.
    Flag,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    pub unique: bool,
}

impl Column {
    fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: true,
            unique: false,
        }
    }

    pub fn integer(name: &'static str) -> Self {
        Self::new(name, ColumnType::Integer)
    }

    pub fn real(name: &'static str) -> Self {
        Self::new(name, ColumnType::Real)
    }

    pub fn text(name: &'static str) -> Self {
        Self::new(name, ColumnType::Text)
    }

    pub fn flag(name: &'static str) -> Self {
        Self::new(name, ColumnType::Flag)
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// A child table's reference to its parent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForeignKey {
    pub column: &'static str,
    pub references: TableName,
    pub referenced_column: &'static str,
    pub on_delete_cascade: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Index {
    pub name: &'static str,
    pub columns: Vec<&'static str>,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSchema {
    pub table: TableName,
    /// Surrogate key, auto-assigned by the store.
    pub primary_key: &'static str,
    /// Data columns in insertion order, the surrogate key excluded.
    pub columns: Vec<Column>,
    pub foreign_key: Option<ForeignKey>,
    pub indexes: Vec<Index>,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name)
    }
}

/// The four property tables, parent first.
pub fn property_schema() -> Vec<TableSchema> {
    TableName::ALL.iter().map(|t| table_schema(*t)).collect()
}

/// Schema of a single table.
pub fn table_schema(table: TableName) -> TableSchema {
    match table {
        TableName::Properties => properties(),
        TableName::Valuations => child(
            table,
            "valuation_index",
            vec![
                Column::real("list_price"),
                Column::real("previous_rent"),
                Column::real("arv"),
                Column::real("rent_zestimate"),
                Column::real("low_fmr"),
                Column::real("high_fmr"),
                Column::real("zestimate"),
                Column::real("expected_rent"),
                Column::real("redfin_value"),
            ],
            "idx_valuations_property",
        ),
        TableName::HoaFees => child(
            table,
            "hoa_index",
            vec![Column::real("hoa_amount"), Column::flag("hoa_flag").not_null()],
            "idx_hoa_fees_property",
        ),
        TableName::RehabAssessments => child(
            table,
            "rehab_index",
            vec![
                Column::real("underwriting_rehab"),
                Column::real("rehab_calculation"),
                Column::text("paint"),
                Column::flag("flooring_flag"),
                Column::flag("foundation_flag"),
                Column::flag("roof_flag"),
                Column::flag("hvac_flag"),
                Column::flag("kitchen_flag"),
                Column::flag("bathroom_flag"),
                Column::flag("appliances_flag"),
                Column::flag("windows_flag"),
                Column::flag("landscaping_flag"),
                Column::flag("trashout_flag"),
            ],
            "idx_rehab_assessments_property",
        ),
    }
}

fn properties() -> TableSchema {
    TableSchema {
        table: TableName::Properties,
        primary_key: "id",
        columns: vec![
            Column::text("property_title").not_null().unique(),
            Column::text("address"),
            Column::text("street_address"),
            Column::text("city"),
            Column::text("state"),
            Column::text("zip_code"),
            Column::real("latitude"),
            Column::real("longitude"),
            Column::text("property_type"),
            Column::integer("year_built"),
            Column::real("sqft_total"),
            Column::real("sqft_basement"),
            Column::real("sqft_mu"),
            Column::integer("bed"),
            Column::real("bath"),
            Column::text("layout"),
            Column::flag("pool"),
            Column::text("parking"),
            Column::flag("basement_yes_no"),
            Column::text("water"),
            Column::text("sewage"),
            Column::flag("htw"),
            Column::flag("commercial"),
            Column::text("highway"),
            Column::text("train"),
            Column::text("flood"),
            Column::text("occupancy"),
            Column::real("net_yield"),
            Column::real("irr"),
            Column::real("taxes"),
            Column::real("tax_rate"),
            Column::text("market"),
            Column::text("source"),
            Column::integer("neighborhood_rating"),
            Column::real("school_average"),
            Column::text("subdivision"),
            Column::text("reviewed_status"),
            Column::text("most_recent_status"),
            Column::text("selling_reason"),
            Column::text("final_reviewer"),
            Column::text("seller_retained_broker"),
            Column::flag("rent_restricted"),
        ],
        foreign_key: None,
        indexes: vec![Index {
            // Advisory only: duplicates are warned about, not refused.
            name: "idx_properties_address_zip",
            columns: vec!["address", "zip_code"],
            unique: false,
        }],
    }
}

fn child(
    table: TableName,
    position_column: &'static str,
    data_columns: Vec<Column>,
    index_name: &'static str,
) -> TableSchema {
    let mut columns = vec![
        Column::text("property_title").not_null(),
        Column::integer(position_column).not_null(),
    ];
    columns.extend(data_columns);

    TableSchema {
        table,
        primary_key: "id",
        columns,
        foreign_key: Some(ForeignKey {
            column: "property_title",
            references: TableName::Properties,
            referenced_column: "property_title",
            on_delete_cascade: true,
        }),
        indexes: vec![Index {
            name: index_name,
            columns: vec!["property_title"],
            unique: false,
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TableRows, ValidatedProperty};
    use crate::transform::denormalize::denormalize;

    #[test]
    fn test_schema_is_parent_first() {
        let schema = property_schema();
        assert_eq!(schema.len(), 4);
        assert_eq!(schema[0].table, TableName::Properties);
        assert!(schema[0].foreign_key.is_none());
        for child in &schema[1..] {
            let fk = child.foreign_key.as_ref().unwrap();
            assert_eq!(fk.references, TableName::Properties);
            assert!(fk.on_delete_cascade);
            assert!(child.indexes.iter().any(|i| i.columns == vec!["property_title"]));
        }
    }

    #[test]
    fn test_natural_key_is_unique_and_required() {
        let schema = table_schema(TableName::Properties);
        let title = schema.column("property_title").unwrap();
        assert!(title.unique);
        assert!(!title.nullable);
        let advisory = &schema.indexes[0];
        assert!(!advisory.unique);
    }

    #[test]
    fn test_denormalized_rows_match_schema_columns() {
        let rows: TableRows = denormalize(&ValidatedProperty {
            hoa_fees: vec![crate::models::HoaFee {
                hoa_amount: None,
                hoa_flag: crate::models::Flag::Yes,
            }],
            valuations: vec![Default::default()],
            rehab_assessments: vec![Default::default()],
            ..ValidatedProperty::new("Fit")
        });

        for (table, table_rows) in rows.iter() {
            let schema = table_schema(table);
            let expected: Vec<_> = schema.column_names().collect();
            let actual: Vec<_> = table_rows[0].columns().collect();
            assert_eq!(actual, expected, "{table}");
        }
    }
}
