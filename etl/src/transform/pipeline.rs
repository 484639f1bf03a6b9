//! Pipeline orchestration: extract, transform, load.
//!
//! A run moves through `INIT → EXTRACTING → TRANSFORMING → LOADING → DONE`;
//! any fatal error ends it in `FAILED`. Record rejections are not fatal
//! unless `skip_invalid` is off. Parse failures abort before the store is
//! touched; load failures abort with the table and batch that failed.
//!
//! # Example
//!
//! ```rust,ignore
//! use home_etl::{Pipeline, PipelineOptions, SqliteStore};
//!
//! let input = std::fs::read_to_string("data/properties.json")?;
//! let mut store = SqliteStore::open_in_memory()?;
//! let summary = Pipeline::new(PipelineOptions::default()).run(&input, &mut store)?;
//! println!("{} valid, {} invalid", summary.records_valid, summary.records_invalid);
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

use super::denormalize::{collect_dimensions, denormalize_all, DimensionCounts, Dimensions};
use crate::config::EtlConfig;
use crate::error::{PipelineError, PipelineResult, RejectionCause};
use crate::logs::{log_error, log_info, log_info_indent, log_success, log_warning};
use crate::models::{TableName, ValidatedProperty};
use crate::parser::{repair_and_parse, Fix};
use crate::store::{BulkLoader, LoadSummary, Store};
use crate::validation::{ElementRejection, RecordRejection, RecordValidator};

/// Stage of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Init,
    Extracting,
    Transforming,
    Loading,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Init => "INIT",
            Stage::Extracting => "EXTRACTING",
            Stage::Transforming => "TRANSFORMING",
            Stage::Loading => "LOADING",
            Stage::Done => "DONE",
            Stage::Failed => "FAILED",
        })
    }
}

/// Options for one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    /// Only process the first N records
    pub max_records: Option<usize>,

    /// Log and skip invalid records instead of aborting
    pub skip_invalid: bool,

    /// Rows per insert transaction
    pub batch_size: usize,

    /// Records denormalized and loaded together; 0 = whole batch
    pub chunk_size: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            max_records: None,
            skip_invalid: true,
            batch_size: 1000,
            chunk_size: 0,
        }
    }
}

impl From<&EtlConfig> for PipelineOptions {
    fn from(config: &EtlConfig) -> Self {
        Self {
            max_records: config.record_limit(),
            skip_invalid: config.skip_invalid,
            batch_size: config.batch_size,
            chunk_size: config.chunk_size,
        }
    }
}

impl fmt::Display for PipelineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max_records {
            Some(n) => write!(f, "max_records={}", n)?,
            None => f.write_str("max_records=all")?,
        }
        write!(
            f,
            ", skip_invalid={}, batch_size={}, chunk_size={}",
            self.skip_invalid, self.batch_size, self.chunk_size
        )
    }
}

/// Output of the EXTRACTING stage.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Records present in the input
    pub records_in_batch: usize,
    /// Records actually validated (after `max_records`)
    pub records_read: usize,
    pub properties: Vec<ValidatedProperty>,
    pub rejections: Vec<RecordRejection>,
    pub element_rejections: Vec<ElementRejection>,
    pub field_coercions: usize,
    pub fixes: Vec<Fix>,
}

/// Result of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub records_in_batch: usize,
    pub records_read: usize,
    pub records_valid: usize,
    pub records_invalid: usize,
    pub rows_inserted: BTreeMap<TableName, u64>,
    pub batches: usize,
    pub elements_rejected: usize,
    pub field_coercions: usize,
    pub repairs_applied: usize,
    pub quasi_duplicates: usize,
    pub dimensions: DimensionCounts,
    pub rejections: Vec<RecordRejection>,
}

impl RunSummary {
    pub fn rows(&self, table: TableName) -> u64 {
        self.rows_inserted.get(&table).copied().unwrap_or(0)
    }

    /// Log the summary in the pipeline's log style.
    pub fn log(&self) {
        log_info("📊 Run summary");
        log_info_indent(format!("Run ID: {}", self.run_id), 1);
        log_info_indent(
            format!(
                "Records: {} read, {} valid, {} invalid",
                self.records_read, self.records_valid, self.records_invalid
            ),
            1,
        );
        for (table, rows) in &self.rows_inserted {
            log_info_indent(format!("{}: {} rows", table, rows), 1);
        }
        log_info_indent(
            format!(
                "Repairs: {}, coercion failures: {}, dropped elements: {}, address duplicates: {}",
                self.repairs_applied,
                self.field_coercions,
                self.elements_rejected,
                self.quasi_duplicates
            ),
            1,
        );
        log_info_indent(
            format!(
                "Dimensions: {} markets, {} sources, {} types, {} layouts",
                self.dimensions.markets,
                self.dimensions.sources,
                self.dimensions.property_types,
                self.dimensions.layouts
            ),
            1,
        );
    }
}

/// The ETL pipeline.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    options: PipelineOptions,
    validator: RecordValidator,
}

impl Pipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            validator: RecordValidator::new(),
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run the whole pipeline against `store`.
    ///
    /// The store schema is reset, so any previous content is replaced.
    pub fn run<S: Store>(&self, input: &str, store: &mut S) -> PipelineResult<RunSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        enter(Stage::Init, &format!("run {} ({})", run_id, self.options));

        match self.run_stages(input, store, run_id, started_at) {
            Ok(summary) => {
                enter(Stage::Done, &format!("{} records valid", summary.records_valid));
                Ok(summary)
            }
            Err(e) => {
                log_error(format!("[{}] {} failed: {}", Stage::Failed, e.stage(), e));
                Err(e)
            }
        }
    }

    /// Run only the EXTRACTING stage: repair, parse and validate.
    pub fn extract(&self, input: &str) -> PipelineResult<Extraction> {
        let (records, fixes) = repair_and_parse(input)?;
        if !fixes.is_empty() {
            log_warning(format!("Repaired input: {} fixes applied", fixes.len()));
            for fix in &fixes {
                debug!(%fix, "Repair");
            }
        }

        let records_in_batch = records.len();
        if records_in_batch == 0 {
            return Err(PipelineError::EmptyInput);
        }

        let limit = self
            .options
            .max_records
            .map_or(records_in_batch, |max| max.min(records_in_batch));
        if limit < records_in_batch {
            log_info(format!("Processing first {} of {} records", limit, records_in_batch));
        } else {
            log_info(format!("Processing all {} records", records_in_batch));
        }

        let mut properties = Vec::with_capacity(limit);
        let mut rejections = Vec::new();
        let mut element_rejections = Vec::new();
        let mut field_coercions = 0;
        let mut first_seen: HashMap<String, usize> = HashMap::new();

        for (i, raw) in records.iter().take(limit).enumerate() {
            let position = i + 1;
            let outcome = self.validator.validate(position, raw).and_then(|record| {
                match first_seen.entry(record.property.property_title.clone()) {
                    Entry::Vacant(slot) => {
                        slot.insert(position);
                        Ok(record)
                    }
                    Entry::Occupied(first) => Err(RecordRejection {
                        position,
                        identifier: Some(first.key().clone()),
                        cause: RejectionCause::DuplicateIdentifier {
                            identifier: first.key().clone(),
                            first_position: *first.get(),
                        },
                    }),
                }
            });

            match outcome {
                Ok(record) => {
                    field_coercions += record.coercion_failures;
                    for dropped in &record.dropped {
                        log_warning(format!("Dropped {}", dropped));
                    }
                    element_rejections.extend(record.dropped);
                    properties.push(record.property);
                }
                Err(rejection) => {
                    log_warning(format!("Rejected {}", rejection));
                    if !self.options.skip_invalid {
                        return Err(PipelineError::Rejected(rejection));
                    }
                    rejections.push(rejection);
                }
            }

            if position % 100 == 0 {
                debug!(processed = position, "Validation progress");
            }
        }

        log_success(format!(
            "Validated {} records: {} valid, {} invalid",
            limit,
            properties.len(),
            rejections.len()
        ));

        Ok(Extraction {
            records_in_batch,
            records_read: limit,
            properties,
            rejections,
            element_rejections,
            field_coercions,
            fixes,
        })
    }

    fn run_stages<S: Store>(
        &self,
        input: &str,
        store: &mut S,
        run_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> PipelineResult<RunSummary> {
        enter(Stage::Extracting, "repair, parse, validate");
        let extraction = self.extract(input)?;
        if extraction.properties.is_empty() {
            return Err(PipelineError::AllInvalid(extraction.rejections.len()));
        }

        let mut loader = BulkLoader::new(store, self.options.batch_size);
        let properties = &extraction.properties;
        let chunk_size = match self.options.chunk_size {
            0 => properties.len(),
            n => n,
        };

        let (load, dimensions) = if chunk_size >= properties.len() {
            enter(Stage::Transforming, "denormalize");
            let rows = denormalize_all(properties);
            let dimensions = collect_dimensions(&rows);
            log_success(format!("Produced {} rows", rows.total()));

            enter(Stage::Loading, "bulk insert");
            (loader.load(&rows)?, dimensions)
        } else {
            // Each chunk goes through TRANSFORMING then LOADING on its own
            enter(Stage::Loading, &format!("chunks of {} records", chunk_size));
            loader.reset()?;
            let mut load = LoadSummary::default();
            let mut dimensions = Dimensions::default();
            for (n, chunk) in properties.chunks(chunk_size).enumerate() {
                debug!(chunk = n + 1, records = chunk.len(), "Loading chunk");
                let rows = denormalize_all(chunk);
                dimensions.absorb(&rows);
                load.merge(loader.insert(&rows)?);
            }
            (load, dimensions)
        };

        loader.verify(&load)?;
        log_success(format!("Verified {} rows across {} tables", load.total(), load.rows_inserted.len()));

        Ok(RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            records_in_batch: extraction.records_in_batch,
            records_read: extraction.records_read,
            records_valid: extraction.properties.len(),
            records_invalid: extraction.rejections.len(),
            rows_inserted: load.rows_inserted,
            batches: load.batches,
            elements_rejected: extraction.element_rejections.len(),
            field_coercions: extraction.field_coercions,
            repairs_applied: extraction.fixes.len(),
            quasi_duplicates: load.quasi_duplicates,
            dimensions: dimensions.counts(),
            rejections: extraction.rejections,
        })
    }
}

fn enter(stage: Stage, detail: &str) {
    log_info(format!("[{}] {}", stage, detail));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadError;
    use crate::store::SqliteStore;
    use rusqlite::types::Value as SqlCell;

    const TWO_RECORDS: &str = include_str!("../../fixtures/two_records.json");
    const MALFORMED: &str = include_str!("../../fixtures/malformed.json");
    const UNREPAIRABLE: &str = include_str!("../../fixtures/unrepairable.json");
    const DUPLICATES: &str = include_str!("../../fixtures/duplicates.json");

    fn run(input: &str, options: PipelineOptions) -> (PipelineResult<RunSummary>, SqliteStore) {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let result = Pipeline::new(options).run(input, &mut store);
        (result, store)
    }

    fn dump(store: &SqliteStore, table: TableName) -> Vec<Vec<SqlCell>> {
        let conn = store.connection();
        let mut stmt = conn
            .prepare(&format!("SELECT * FROM {} ORDER BY id", table))
            .unwrap();
        let width = stmt.column_count();
        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get::<_, SqlCell>(i))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })
            .unwrap();
        rows.map(Result::unwrap).collect()
    }

    fn table_count(store: &SqliteStore) -> i64 {
        store
            .connection()
            .query_row("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_end_to_end_two_records() {
        let (result, store) = run(TWO_RECORDS, PipelineOptions::default());
        let summary = result.unwrap();

        assert_eq!(summary.records_read, 2);
        assert_eq!(summary.records_valid, 1);
        assert_eq!(summary.records_invalid, 1);
        assert_eq!(summary.rows(TableName::Properties), 1);
        assert_eq!(summary.rows(TableName::Valuations), 2);
        assert_eq!(summary.rows(TableName::HoaFees), 1);
        assert_eq!(summary.rows(TableName::RehabAssessments), 0);
        assert_eq!(summary.rejections[0].position, 2);
        assert_eq!(summary.rejections[0].cause, RejectionCause::MissingIdentifier);
        assert_eq!(summary.dimensions.markets, 1);
        assert_eq!(summary.repairs_applied, 0);

        for table in TableName::ALL {
            assert_eq!(store.count_rows(table).unwrap(), summary.rows(table));
        }
        let sqft: f64 = store
            .connection()
            .query_row("SELECT sqft_total FROM properties", [], |r| r.get(0))
            .unwrap();
        assert_eq!(sqft, 5649.0);
    }

    #[test]
    fn test_every_child_has_one_parent() {
        let (result, store) = run(MALFORMED, PipelineOptions::default());
        result.unwrap();

        for table in TableName::CHILDREN {
            let orphans: i64 = store
                .connection()
                .query_row(
                    &format!(
                        "SELECT COUNT(*) FROM {} c LEFT JOIN properties p \
                         ON p.property_title = c.property_title WHERE p.id IS NULL",
                        table
                    ),
                    [],
                    |r| r.get(0),
                )
                .unwrap();
            assert_eq!(orphans, 0, "{table}");
        }
    }

    #[test]
    fn test_idempotent_double_run() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let pipeline = Pipeline::default();

        let first = pipeline.run(TWO_RECORDS, &mut store).unwrap();
        let second = pipeline.run(TWO_RECORDS, &mut store).unwrap();

        assert_eq!(first.rows_inserted, second.rows_inserted);
        assert_ne!(first.run_id, second.run_id);
        assert_eq!(store.count_rows(TableName::Valuations).unwrap(), 2);
    }

    #[test]
    fn test_malformed_input_is_repaired() {
        let (result, store) = run(MALFORMED, PipelineOptions::default());
        let summary = result.unwrap();

        assert_eq!(summary.records_valid, 2);
        assert!(summary.repairs_applied >= 9);
        // One HOA entry has an unusable flag; its sibling survives
        assert_eq!(summary.rows(TableName::HoaFees), 1);
        assert_eq!(summary.elements_rejected, 1);
        assert_eq!(summary.rows(TableName::Valuations), 1);
        assert_eq!(summary.rows(TableName::RehabAssessments), 1);

        let (bed, pool): (i64, String) = store
            .connection()
            .query_row(
                "SELECT bed, pool FROM properties WHERE property_title = 'Cedar Court'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(bed, 4);
        assert_eq!(pool, "NO");
    }

    #[test]
    fn test_unrepairable_input_never_touches_store() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let err = Pipeline::default().run(UNREPAIRABLE, &mut store).unwrap_err();

        assert!(matches!(err, PipelineError::Parse(_)));
        assert_eq!(err.stage(), Stage::Extracting);
        assert_eq!(table_count(&store), 0);
    }

    #[test]
    fn test_duplicate_identifier_rejected() {
        let (result, store) = run(DUPLICATES, PipelineOptions::default());
        let summary = result.unwrap();

        assert_eq!(summary.records_valid, 2);
        assert_eq!(summary.records_invalid, 1);
        assert_eq!(
            summary.rejections[0].cause,
            RejectionCause::DuplicateIdentifier {
                identifier: "Twin Oaks".into(),
                first_position: 1,
            }
        );
        // The first occurrence wins, nothing is merged
        let price: f64 = store
            .connection()
            .query_row("SELECT list_price FROM valuations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(price, 300000.0);
    }

    #[test]
    fn test_fail_fast_on_rejection() {
        let options = PipelineOptions {
            skip_invalid: false,
            ..Default::default()
        };
        let (result, store) = run(TWO_RECORDS, options);

        match result.unwrap_err() {
            PipelineError::Rejected(rejection) => assert_eq!(rejection.position, 2),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(table_count(&store), 0);
    }

    #[test]
    fn test_empty_and_all_invalid() {
        let (result, _) = run("[]", PipelineOptions::default());
        assert!(matches!(result, Err(PipelineError::EmptyInput)));

        let (result, _) = run(r#"[{"Property_Title": ""}, {"City": "Austin"}]"#, PipelineOptions::default());
        assert!(matches!(result, Err(PipelineError::AllInvalid(2))));
    }

    #[test]
    fn test_max_records() {
        let options = PipelineOptions {
            max_records: Some(1),
            ..Default::default()
        };
        let (result, _) = run(DUPLICATES, options);
        let summary = result.unwrap();

        assert_eq!(summary.records_in_batch, 3);
        assert_eq!(summary.records_read, 1);
        assert_eq!(summary.records_invalid, 0);
    }

    #[test]
    fn test_chunked_matches_unchunked() {
        let input = r#"[
            {"Property_Title": "P1", "Market": "Austin", "Valuation": [{"ARV": 1}, {"ARV": 2}]},
            {"Property_Title": "P2", "HOA": [{"HOA": 10, "HOA_Flag": "yes"}]},
            {"Property_Title": "P3", "Market": "Dallas", "Rehab": [{"Paint": "Light"}]},
            {"Property_Title": "P4", "Valuation": [{"ARV": 3}], "HOA": [{"HOA_Flag": "no"}]},
            {"Property_Title": "P5", "Market": "Austin"}
        ]"#;

        let (whole, whole_store) = run(input, PipelineOptions::default());
        let (chunked, chunked_store) = run(
            input,
            PipelineOptions {
                chunk_size: 2,
                batch_size: 1,
                ..Default::default()
            },
        );
        let (whole, chunked) = (whole.unwrap(), chunked.unwrap());

        assert_eq!(whole.rows_inserted, chunked.rows_inserted);
        assert_eq!(whole.dimensions, chunked.dimensions);
        for table in TableName::ALL {
            assert_eq!(dump(&whole_store, table), dump(&chunked_store, table), "{table}");
        }
    }

    #[test]
    fn test_load_failure_reports_loading_stage() {
        struct BrokenStore;

        impl Store for BrokenStore {
            fn reset_schema(&mut self, _: &[crate::store::TableSchema]) -> crate::error::StoreResult<()> {
                Ok(())
            }
            fn insert_batch(
                &mut self,
                _: &crate::store::TableSchema,
                _: &[crate::models::FactRow],
            ) -> crate::error::StoreResult<usize> {
                Err(crate::error::StoreError::Timeout("busy".into()))
            }
            fn count_rows(&self, _: TableName) -> crate::error::StoreResult<u64> {
                Ok(0)
            }
            fn max_bind_params(&self) -> usize {
                100
            }
        }

        let err = Pipeline::default().run(TWO_RECORDS, &mut BrokenStore).unwrap_err();
        assert_eq!(err.stage(), Stage::Loading);
        assert!(matches!(
            err,
            PipelineError::Load(LoadError::Batch {
                table: TableName::Properties,
                batch: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_options_describe_effective_settings() {
        assert_eq!(
            PipelineOptions::default().to_string(),
            "max_records=all, skip_invalid=true, batch_size=1000, chunk_size=0"
        );

        let config = EtlConfig {
            max_records: 25,
            skip_invalid: false,
            ..Default::default()
        };
        let described = PipelineOptions::from(&config).to_string();
        assert!(described.starts_with("max_records=25, skip_invalid=false"));
    }

    #[test]
    fn test_summary_serializes() {
        let (result, _) = run(TWO_RECORDS, PipelineOptions::default());
        let json = serde_json::to_value(result.unwrap()).unwrap();
        assert_eq!(json["rows_inserted"]["valuations"], 2);
        assert_eq!(json["rejections"][0]["cause"]["kind"], "missing_identifier");
    }
}
