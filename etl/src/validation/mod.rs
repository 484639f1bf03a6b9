//! Record validation for raw property records.
//!
//! Validation runs in two passes:
//!
//! 1. **Shape**: the record is checked against the embedded JSON Schema
//!    (Draft 7) from `schemas/property-record.json`. Only structure is
//!    checked there: the record is an object and its repeating groups are
//!    arrays when present.
//! 2. **Fields**: every known field is coerced with the normalizers from
//!    [`crate::transform::normalize`]. Coercion never rejects a record; a
//!    non-empty value that degrades to null is counted and logged at debug
//!    level.
//!
//! A record without a usable `Property_Title` is rejected. Inside the
//! repeating groups, an element that is not an object, or an HOA entry
//! without a YES/NO `HOA_Flag`, is dropped alone.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use home_etl::validation::RecordValidator;
//!
//! let validator = RecordValidator::new();
//! let record = validator
//!     .validate(1, &json!({ "Property_Title": "Maple House", "SQFT_Total": "5649 sqft" }))
//!     .unwrap();
//! assert_eq!(record.property.sqft_total, Some(5649.0));
//! ```

use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use tracing::debug;

use crate::error::{ElementCause, RejectionCause};
use crate::models::{Flag, HoaFee, RehabAssessment, ValidatedProperty, Valuation};
use crate::transform::normalize::{
    is_blank, normalize_flag, normalize_integer, normalize_numeric, normalize_text,
};

/// Source key of the natural identifier.
pub const IDENTIFIER_KEY: &str = "Property_Title";

/// The embedded record schema.
pub static PROPERTY_SCHEMA: Lazy<Value> = Lazy::new(|| {
    serde_json::from_str(include_str!("../../schemas/property-record.json"))
        .expect("Invalid embedded schema")
});

static PROPERTY_VALIDATOR: Lazy<jsonschema::Validator> =
    Lazy::new(|| jsonschema::draft7::new(&PROPERTY_SCHEMA).expect("Invalid embedded schema"));

/// Validate a value against a compiled schema, collecting every error.
pub fn validate_shape(validator: &jsonschema::Validator, data: &Value) -> Result<(), Vec<String>> {
    let errors: Vec<String> = validator.iter_errors(data).map(|e| e.to_string()).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Quick check against the property record schema.
pub fn is_valid_record_shape(data: &Value) -> bool {
    PROPERTY_VALIDATOR.is_valid(data)
}

// =============================================================================
// Rejections
// =============================================================================

/// A whole record that was rejected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordRejection {
    /// 1-based position in the batch.
    pub position: usize,
    pub identifier: Option<String>,
    pub cause: RejectionCause,
}

impl fmt::Display for RecordRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.identifier {
            Some(id) => write!(f, "record {} ('{}'): {}", self.position, id, self.cause),
            None => write!(f, "record {}: {}", self.position, self.cause),
        }
    }
}

/// The three repeating groups of a property record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Group {
    Valuation,
    #[serde(rename = "HOA")]
    Hoa,
    Rehab,
}

impl Group {
    /// Key of the group in the raw record.
    pub fn source_key(&self) -> &'static str {
        match self {
            Group::Valuation => "Valuation",
            Group::Hoa => "HOA",
            Group::Rehab => "Rehab",
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source_key())
    }
}

/// One nested element that was dropped; its parent was kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementRejection {
    pub position: usize,
    pub identifier: String,
    pub group: Group,
    /// 1-based index inside the group.
    pub index: usize,
    pub cause: ElementCause,
}

impl fmt::Display for ElementRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "record {} ('{}') {}[{}]: {}",
            self.position, self.identifier, self.group, self.index, self.cause
        )
    }
}

/// A record that passed validation, with what was dropped along the way.
#[derive(Debug, Clone)]
pub struct ValidatedRecord {
    pub property: ValidatedProperty,
    pub dropped: Vec<ElementRejection>,
    pub coercion_failures: usize,
}

// =============================================================================
// Field Reader
// =============================================================================

/// Typed access to a raw object, counting coercion failures.
struct FieldReader<'a> {
    fields: &'a Map<String, Value>,
    position: usize,
    failures: usize,
}

impl<'a> FieldReader<'a> {
    fn new(fields: &'a Map<String, Value>, position: usize) -> Self {
        Self {
            fields,
            position,
            failures: 0,
        }
    }

    fn coerce<T>(&mut self, key: &str, convert: fn(&Value) -> Option<T>) -> Option<T> {
        let raw = self.fields.get(key)?;
        let value = convert(raw);
        if value.is_none() && !is_blank(raw) {
            self.failures += 1;
            debug!(record = self.position, field = key, raw = %raw, "Coercion failed, stored as null");
        }
        value
    }

    fn text(&mut self, key: &str) -> Option<String> {
        self.coerce(key, normalize_text)
    }

    fn numeric(&mut self, key: &str) -> Option<f64> {
        self.coerce(key, normalize_numeric)
    }

    fn integer(&mut self, key: &str) -> Option<i64> {
        self.coerce(key, normalize_integer)
    }

    fn flag(&mut self, key: &str) -> Option<Flag> {
        self.coerce(key, normalize_flag)
    }
}

// =============================================================================
// Validator
// =============================================================================

/// Validates raw records into [`ValidatedProperty`] values.
#[derive(Clone, Copy)]
pub struct RecordValidator {
    schema: &'static jsonschema::Validator,
}

impl Default for RecordValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RecordValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordValidator").finish_non_exhaustive()
    }
}

impl RecordValidator {
    pub fn new() -> Self {
        Self {
            schema: &PROPERTY_VALIDATOR,
        }
    }

    /// Validate the record at 1-based `position`.
    pub fn validate(&self, position: usize, raw: &Value) -> Result<ValidatedRecord, RecordRejection> {
        let identifier = raw
            .get(IDENTIFIER_KEY)
            .and_then(normalize_text)
            .filter(|s| !s.is_empty());

        if let Err(errors) = validate_shape(self.schema, raw) {
            return Err(RecordRejection {
                position,
                identifier,
                cause: RejectionCause::Shape { errors },
            });
        }

        let (Some(fields), Some(title)) = (raw.as_object(), identifier) else {
            return Err(RecordRejection {
                position,
                identifier: None,
                cause: RejectionCause::MissingIdentifier,
            });
        };

        let mut reader = FieldReader::new(fields, position);
        let mut property = read_property(&mut reader, title);
        let mut dropped = Vec::new();
        let mut failures = reader.failures;

        for (index, element) in group_elements(fields, Group::Valuation) {
            match element.as_object() {
                Some(obj) => {
                    let mut r = FieldReader::new(obj, position);
                    property.valuations.push(read_valuation(&mut r));
                    failures += r.failures;
                }
                None => dropped.push(element_rejection(
                    position,
                    &property,
                    Group::Valuation,
                    index,
                    ElementCause::NotAnObject,
                )),
            }
        }

        for (index, element) in group_elements(fields, Group::Hoa) {
            let Some(obj) = element.as_object() else {
                dropped.push(element_rejection(
                    position,
                    &property,
                    Group::Hoa,
                    index,
                    ElementCause::NotAnObject,
                ));
                continue;
            };
            let mut r = FieldReader::new(obj, position);
            match read_hoa(&mut r) {
                Some(fee) => property.hoa_fees.push(fee),
                None => dropped.push(element_rejection(
                    position,
                    &property,
                    Group::Hoa,
                    index,
                    ElementCause::MissingFlag {
                        field: "HOA_Flag".to_string(),
                    },
                )),
            }
            failures += r.failures;
        }

        for (index, element) in group_elements(fields, Group::Rehab) {
            match element.as_object() {
                Some(obj) => {
                    let mut r = FieldReader::new(obj, position);
                    property.rehab_assessments.push(read_rehab(&mut r));
                    failures += r.failures;
                }
                None => dropped.push(element_rejection(
                    position,
                    &property,
                    Group::Rehab,
                    index,
                    ElementCause::NotAnObject,
                )),
            }
        }

        Ok(ValidatedRecord {
            property,
            dropped,
            coercion_failures: failures,
        })
    }
}

/// Elements of a group with their 1-based index. Absent or null → empty.
fn group_elements(fields: &Map<String, Value>, group: Group) -> impl Iterator<Item = (usize, &Value)> {
    fields
        .get(group.source_key())
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .enumerate()
        .map(|(i, v)| (i + 1, v))
}

fn element_rejection(
    position: usize,
    property: &ValidatedProperty,
    group: Group,
    index: usize,
    cause: ElementCause,
) -> ElementRejection {
    ElementRejection {
        position,
        identifier: property.property_title.clone(),
        group,
        index,
        cause,
    }
}

fn read_property(r: &mut FieldReader<'_>, property_title: String) -> ValidatedProperty {
    ValidatedProperty {
        property_title,
        address: r.text("Address"),
        street_address: r.text("Street_Address"),
        city: r.text("City"),
        state: r.text("State"),
        zip_code: r.text("Zip"),
        latitude: r.numeric("Latitude"),
        longitude: r.numeric("Longitude"),

        property_type: r.text("Property_Type"),
        year_built: r.integer("Year_Built"),
        sqft_total: r.numeric("SQFT_Total"),
        sqft_basement: r.numeric("SQFT_Basement"),
        sqft_mu: r.numeric("SQFT_MU"),
        bed: r.integer("Bed"),
        bath: r.numeric("Bath"),

        layout: r.text("Layout"),
        pool: r.flag("Pool"),
        parking: r.text("Parking"),
        basement_yes_no: r.flag("BasementYesNo"),
        water: r.text("Water"),
        sewage: r.text("Sewage"),
        htw: r.flag("HTW"),
        commercial: r.flag("Commercial"),
        highway: r.text("Highway"),
        train: r.text("Train"),
        flood: r.text("Flood"),
        occupancy: r.text("Occupancy"),

        net_yield: r.numeric("Net_Yield"),
        irr: r.numeric("IRR"),
        taxes: r.numeric("Taxes"),
        tax_rate: r.numeric("Tax_Rate"),

        market: r.text("Market"),
        source: r.text("Source"),
        neighborhood_rating: r.integer("Neighborhood_Rating"),
        school_average: r.numeric("School_Average"),
        subdivision: r.text("Subdivision"),

        reviewed_status: r.text("Reviewed_Status"),
        most_recent_status: r.text("Most_Recent_Status"),
        selling_reason: r.text("Selling_Reason"),
        final_reviewer: r.text("Final_Reviewer"),
        seller_retained_broker: r.text("Seller_Retained_Broker"),
        rent_restricted: r.flag("Rent_Restricted"),

        valuations: Vec::new(),
        hoa_fees: Vec::new(),
        rehab_assessments: Vec::new(),
    }
}

fn read_valuation(r: &mut FieldReader<'_>) -> Valuation {
    Valuation {
        list_price: r.numeric("List_Price"),
        previous_rent: r.numeric("Previous_Rent"),
        arv: r.numeric("ARV"),
        rent_zestimate: r.numeric("Rent_Zestimate"),
        low_fmr: r.numeric("Low_FMR"),
        high_fmr: r.numeric("High_FMR"),
        zestimate: r.numeric("Zestimate"),
        expected_rent: r.numeric("Expected_Rent"),
        redfin_value: r.numeric("Redfin_Value"),
    }
}

fn read_hoa(r: &mut FieldReader<'_>) -> Option<HoaFee> {
    let hoa_amount = r.numeric("HOA");
    let hoa_flag = r.flag("HOA_Flag")?;
    Some(HoaFee { hoa_amount, hoa_flag })
}

fn read_rehab(r: &mut FieldReader<'_>) -> RehabAssessment {
    RehabAssessment {
        underwriting_rehab: r.numeric("Underwriting_Rehab"),
        rehab_calculation: r.numeric("Rehab_Calculation"),
        paint: r.text("Paint"),
        flooring_flag: r.flag("Flooring_Flag"),
        foundation_flag: r.flag("Foundation_Flag"),
        roof_flag: r.flag("Roof_Flag"),
        hvac_flag: r.flag("HVAC_Flag"),
        kitchen_flag: r.flag("Kitchen_Flag"),
        bathroom_flag: r.flag("Bathroom_Flag"),
        appliances_flag: r.flag("Appliances_Flag"),
        windows_flag: r.flag("Windows_Flag"),
        landscaping_flag: r.flag("Landscaping_Flag"),
        trashout_flag: r.flag("Trashout_Flag"),
    }
}
