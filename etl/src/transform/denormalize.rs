//! Denormalization of validated properties into per-table fact rows.
//!
//! One [`ValidatedProperty`] becomes exactly one `properties` row plus one
//! child row per repeating-group element. Child rows reference the parent by
//! `property_title` and carry their 1-based position in the source group.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::models::{FactRow, TableName, TableRows, ValidatedProperty};

/// Foreign key column carried by every child row.
pub const PARENT_KEY: &str = "property_title";

/// Flatten one property into rows for all four tables.
pub fn denormalize(property: &ValidatedProperty) -> TableRows {
    let mut rows = TableRows::new();
    let title = property.property_title.as_str();

    rows.push(property_row(property));

    for (i, v) in property.valuations.iter().enumerate() {
        rows.push(
            FactRow::new(TableName::Valuations)
                .with(PARENT_KEY, title)
                .with("valuation_index", i + 1)
                .with("list_price", v.list_price)
                .with("previous_rent", v.previous_rent)
                .with("arv", v.arv)
                .with("rent_zestimate", v.rent_zestimate)
                .with("low_fmr", v.low_fmr)
                .with("high_fmr", v.high_fmr)
                .with("zestimate", v.zestimate)
                .with("expected_rent", v.expected_rent)
                .with("redfin_value", v.redfin_value),
        );
    }

    for (i, h) in property.hoa_fees.iter().enumerate() {
        rows.push(
            FactRow::new(TableName::HoaFees)
                .with(PARENT_KEY, title)
                .with("hoa_index", i + 1)
                .with("hoa_amount", h.hoa_amount)
                .with("hoa_flag", h.hoa_flag),
        );
    }

    for (i, r) in property.rehab_assessments.iter().enumerate() {
        rows.push(
            FactRow::new(TableName::RehabAssessments)
                .with(PARENT_KEY, title)
                .with("rehab_index", i + 1)
                .with("underwriting_rehab", r.underwriting_rehab)
                .with("rehab_calculation", r.rehab_calculation)
                .with("paint", &r.paint)
                .with("flooring_flag", r.flooring_flag)
                .with("foundation_flag", r.foundation_flag)
                .with("roof_flag", r.roof_flag)
                .with("hvac_flag", r.hvac_flag)
                .with("kitchen_flag", r.kitchen_flag)
                .with("bathroom_flag", r.bathroom_flag)
                .with("appliances_flag", r.appliances_flag)
                .with("windows_flag", r.windows_flag)
                .with("landscaping_flag", r.landscaping_flag)
                .with("trashout_flag", r.trashout_flag),
        );
    }

    rows
}

/// Denormalize many properties, keeping input order within every table.
pub fn denormalize_all<'a, I>(properties: I) -> TableRows
where
    I: IntoIterator<Item = &'a ValidatedProperty>,
{
    let mut rows = TableRows::new();
    for property in properties {
        rows.merge(denormalize(property));
    }
    rows
}

fn property_row(p: &ValidatedProperty) -> FactRow {
    FactRow::new(TableName::Properties)
        .with("property_title", p.property_title.as_str())
        .with("address", &p.address)
        .with("street_address", &p.street_address)
        .with("city", &p.city)
        .with("state", &p.state)
        .with("zip_code", &p.zip_code)
        .with("latitude", p.latitude)
        .with("longitude", p.longitude)
        .with("property_type", &p.property_type)
        .with("year_built", p.year_built)
        .with("sqft_total", p.sqft_total)
        .with("sqft_basement", p.sqft_basement)
        .with("sqft_mu", p.sqft_mu)
        .with("bed", p.bed)
        .with("bath", p.bath)
        .with("layout", &p.layout)
        .with("pool", p.pool)
        .with("parking", &p.parking)
        .with("basement_yes_no", p.basement_yes_no)
        .with("water", &p.water)
        .with("sewage", &p.sewage)
        .with("htw", p.htw)
        .with("commercial", p.commercial)
        .with("highway", &p.highway)
        .with("train", &p.train)
        .with("flood", &p.flood)
        .with("occupancy", &p.occupancy)
        .with("net_yield", p.net_yield)
        .with("irr", p.irr)
        .with("taxes", p.taxes)
        .with("tax_rate", p.tax_rate)
        .with("market", &p.market)
        .with("source", &p.source)
        .with("neighborhood_rating", p.neighborhood_rating)
        .with("school_average", p.school_average)
        .with("subdivision", &p.subdivision)
        .with("reviewed_status", &p.reviewed_status)
        .with("most_recent_status", &p.most_recent_status)
        .with("selling_reason", &p.selling_reason)
        .with("final_reviewer", &p.final_reviewer)
        .with("seller_retained_broker", &p.seller_retained_broker)
        .with("rent_restricted", p.rent_restricted)
}

// =============================================================================
// Dimensions
// =============================================================================

/// Distinct classification values seen in the parent rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dimensions {
    pub markets: BTreeSet<String>,
    pub sources: BTreeSet<String>,
    pub property_types: BTreeSet<String>,
    pub layouts: BTreeSet<String>,
}

/// Number of distinct values per dimension, as reported in the run summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DimensionCounts {
    pub markets: usize,
    pub sources: usize,
    pub property_types: usize,
    pub layouts: usize,
}

impl Dimensions {
    /// Add the dimension values of every parent row in `rows`.
    pub fn absorb(&mut self, rows: &TableRows) {
        for row in rows.rows(TableName::Properties) {
            let add = |set: &mut BTreeSet<String>, column: &str| {
                if let Some(value) = row.get(column).and_then(|v| v.as_text()) {
                    set.insert(value.to_string());
                }
            };
            add(&mut self.markets, "market");
            add(&mut self.sources, "source");
            add(&mut self.property_types, "property_type");
            add(&mut self.layouts, "layout");
        }
    }

    pub fn counts(&self) -> DimensionCounts {
        DimensionCounts {
            markets: self.markets.len(),
            sources: self.sources.len(),
            property_types: self.property_types.len(),
            layouts: self.layouts.len(),
        }
    }
}

/// Distinct markets, sources, property types and layouts in `rows`.
pub fn collect_dimensions(rows: &TableRows) -> Dimensions {
    let mut dimensions = Dimensions::default();
    dimensions.absorb(rows);
    dimensions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Flag, HoaFee, RehabAssessment, SqlValue, Valuation};

    fn sample() -> ValidatedProperty {
        let mut p = ValidatedProperty::new("Maple House");
        p.city = Some("Austin".into());
        p.sqft_total = Some(5649.0);
        p.market = Some("Austin".into());
        p.layout = Some("Ranch".into());
        p.valuations = vec![
            Valuation {
                list_price: Some(250000.0),
                ..Default::default()
            },
            Valuation {
                arv: Some(300000.0),
                ..Default::default()
            },
        ];
        p.hoa_fees = vec![HoaFee {
            hoa_amount: None,
            hoa_flag: Flag::No,
        }];
        p
    }

    #[test]
    fn test_one_parent_row_and_children() {
        let rows = denormalize(&sample());

        assert_eq!(rows.len(TableName::Properties), 1);
        assert_eq!(rows.len(TableName::Valuations), 2);
        assert_eq!(rows.len(TableName::HoaFees), 1);
        assert_eq!(rows.len(TableName::RehabAssessments), 0);

        let parent = &rows.rows(TableName::Properties)[0];
        assert_eq!(parent.get("sqft_total"), Some(&SqlValue::Real(5649.0)));
        assert_eq!(parent.get("state"), Some(&SqlValue::Null));
    }

    #[test]
    fn test_children_carry_parent_key_and_position() {
        let rows = denormalize(&sample());

        for (i, row) in rows.rows(TableName::Valuations).iter().enumerate() {
            assert_eq!(row.get(PARENT_KEY).and_then(SqlValue::as_text), Some("Maple House"));
            assert_eq!(row.get("valuation_index"), Some(&SqlValue::Integer(i as i64 + 1)));
        }
        let hoa = &rows.rows(TableName::HoaFees)[0];
        assert_eq!(hoa.get("hoa_flag"), Some(&SqlValue::Text("NO".into())));
        assert_eq!(hoa.get("hoa_amount"), Some(&SqlValue::Null));
    }

    #[test]
    fn test_deterministic() {
        let p = sample();
        assert_eq!(denormalize(&p), denormalize(&p));
    }

    #[test]
    fn test_rehab_flags() {
        let mut p = ValidatedProperty::new("Oak");
        p.rehab_assessments = vec![RehabAssessment {
            paint: Some("Heavy".into()),
            roof_flag: Some(Flag::Yes),
            ..Default::default()
        }];

        let rows = denormalize(&p);
        let rehab = &rows.rows(TableName::RehabAssessments)[0];
        assert_eq!(rehab.get("rehab_index"), Some(&SqlValue::Integer(1)));
        assert_eq!(rehab.get("roof_flag"), Some(&SqlValue::Text("YES".into())));
        assert_eq!(rehab.get("kitchen_flag"), Some(&SqlValue::Null));
        assert_eq!(rehab.columns().count(), 15);
    }

    #[test]
    fn test_denormalize_all_keeps_order() {
        let first = sample();
        let second = ValidatedProperty::new("Oak");
        let rows = denormalize_all([&first, &second]);

        let titles: Vec<_> = rows
            .rows(TableName::Properties)
            .iter()
            .filter_map(|r| r.get("property_title").and_then(SqlValue::as_text))
            .collect();
        assert_eq!(titles, vec!["Maple House", "Oak"]);
    }

    #[test]
    fn test_dimensions() {
        let mut other = ValidatedProperty::new("Oak");
        other.market = Some("Austin".into());
        other.source = Some("MLS".into());
        let rows = denormalize_all([&sample(), &other]);

        let counts = collect_dimensions(&rows).counts();
        assert_eq!(
            counts,
            DimensionCounts {
                markets: 1,
                sources: 1,
                property_types: 0,
                layouts: 1,
            }
        );
    }
}
