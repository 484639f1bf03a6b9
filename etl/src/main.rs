//! Home ETL CLI - Load property records into SQLite
//!
//! # Main Commands
//!
//! ```bash
//! home-etl run                        # Full ETL run (input/db from env or flags)
//! home-etl run --input data.json --db out.sqlite --chunk-size 500
//! ```
//!
//! # Debug Commands (for development)
//!
//! ```bash
//! home-etl repair input.json          # Print repaired JSON and the fixes applied
//! home-etl validate input.json        # Dry run: repair, parse and validate only
//! home-etl schema                     # Print the SQLite DDL
//! ```

use clap::{Parser, Subcommand};
use home_etl::logs::{init_logging, log_error};
use home_etl::{
    property_schema, read_input, render_ddl, repair, EtlConfig, Pipeline, PipelineOptions,
    SqliteStore,
};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;

#[derive(Parser)]
#[command(name = "home-etl")]
#[command(about = "Validate, denormalize and bulk load property records", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Full pipeline: JSON → repair → validate → denormalize → SQLite
    Run {
        /// Input JSON file (default: JSON_INPUT_FILE)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// SQLite database file (default: DB_PATH)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Only process the first N records (0 = all)
        #[arg(long)]
        max_records: Option<usize>,

        /// Rows per insert transaction
        #[arg(long)]
        batch_size: Option<usize>,

        /// Records loaded per chunk (0 = whole batch)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Abort on the first invalid record instead of skipping it
        #[arg(long)]
        fail_fast: bool,

        /// Write the run summary as JSON to this file
        #[arg(long)]
        summary_out: Option<PathBuf>,
    },

    /// Repair a malformed JSON file and output the result
    Repair {
        /// Input JSON file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate records without touching the database
    Validate {
        /// Input JSON file (array of records)
        input: PathBuf,
    },

    /// Print the SQLite schema
    Schema,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Loads .env (if present) then the environment
    let config = match EtlConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            print_error_chain(&e);
            return ExitCode::FAILURE;
        }
    };
    let log_guard = init_logging(&config.log_level, config.log_file.as_deref());

    let result = match cli.command {
        Commands::Run {
            input,
            db,
            max_records,
            batch_size,
            chunk_size,
            fail_fast,
            summary_out,
        } => {
            let mut config = config;
            if let Some(input) = input {
                config.input_file = input;
            }
            if let Some(db) = db {
                config.store.path = db;
            }
            if let Some(n) = max_records {
                config.max_records = n;
            }
            if let Some(n) = batch_size {
                config.batch_size = n.max(1);
            }
            if let Some(n) = chunk_size {
                config.chunk_size = n;
            }
            if fail_fast {
                config.skip_invalid = false;
            }
            cmd_run(&config, summary_out.as_deref())
        }

        Commands::Repair { input, output } => cmd_repair(&input, output.as_deref()),

        Commands::Validate { input } => cmd_validate(&input, &config),

        Commands::Schema => cmd_schema(),
    };

    finish(result, log_guard)
}

/// Report the outcome and flush the log file before the process exits.
fn finish(result: Result<(), Box<dyn Error>>, log_guard: Option<WorkerGuard>) -> ExitCode {
    let code = match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log_error(format!("Error: {}", e));
            print_error_chain(&*e);
            ExitCode::FAILURE
        }
    };
    drop(log_guard);
    code
}

fn print_error_chain(e: &dyn Error) {
    eprintln!("❌ Error: {}", e);
    let mut source = e.source();
    while let Some(cause) = source {
        eprintln!("   caused by: {}", cause);
        source = cause.source();
    }
}

fn cmd_run(config: &EtlConfig, summary_out: Option<&Path>) -> Result<(), Box<dyn Error>> {
    eprintln!("📄 Processing: {}", config.input_file.display());
    eprintln!("   Database: {}", config.store.path.display());
    config.log();

    let input = read_input(&config.input_file)?;
    let mut store = SqliteStore::open(&config.store)?;

    let summary = Pipeline::new(PipelineOptions::from(config)).run(&input, &mut store)?;
    summary.log();

    if let Some(path) = summary_out {
        fs::write(path, serde_json::to_string_pretty(&summary)?)?;
        eprintln!("💾 Summary written to: {}", path.display());
    }

    eprintln!("\n✨ Done!");
    Ok(())
}

fn cmd_repair(input: &Path, output: Option<&Path>) -> Result<(), Box<dyn Error>> {
    eprintln!("🔧 Repairing: {}", input.display());

    let text = read_input(input)?;
    let repaired = repair(&text);

    if repaired.is_clean() {
        eprintln!("   ✅ No repairs needed");
    } else {
        eprintln!("   {} fixes applied:", repaired.fixes.len());
        for fix in &repaired.fixes {
            eprintln!("     - {}", fix);
        }
    }

    // Fail loudly if the result is still not JSON
    home_etl::parse_batch(&repaired.text)?;

    write_output(&repaired.text, output)
}

fn cmd_validate(input: &Path, config: &EtlConfig) -> Result<(), Box<dyn Error>> {
    eprintln!("✔️  Validating: {}", input.display());

    let text = read_input(input)?;
    let options = PipelineOptions {
        skip_invalid: true,
        ..PipelineOptions::from(config)
    };
    let extraction = Pipeline::new(options).extract(&text)?;

    eprintln!(
        "\n📊 Results: {} read, {} valid, {} invalid",
        extraction.records_read,
        extraction.properties.len(),
        extraction.rejections.len()
    );
    eprintln!(
        "   Repairs: {}, dropped elements: {}, coercion failures: {}",
        extraction.fixes.len(),
        extraction.element_rejections.len(),
        extraction.field_coercions
    );

    for rejection in extraction.rejections.iter().take(5) {
        eprintln!("   ❌ {}", rejection);
    }
    if extraction.rejections.len() > 5 {
        eprintln!("   ... and {} more", extraction.rejections.len() - 5);
    }

    if !extraction.rejections.is_empty() {
        return Err(format!(
            "{} of {} records failed validation",
            extraction.rejections.len(),
            extraction.records_read
        )
        .into());
    }

    Ok(())
}

fn cmd_schema() -> Result<(), Box<dyn Error>> {
    println!("{}", render_ddl(&property_schema()));
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use home_etl::logs::file_writer;
    use tracing_subscriber::fmt;

    #[test]
    fn test_failure_reaches_log_file_before_exit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etl.log");
        let (writer, guard) = file_writer(&path).unwrap();
        let subscriber = fmt().with_ansi(false).with_writer(writer).finish();

        tracing::subscriber::with_default(subscriber, || {
            log_error("[FAILED] EXTRACTING failed: Batch parse failed");
            finish(Err("Batch parse failed".into()), Some(guard));
        });

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("[FAILED] EXTRACTING failed"));
        assert!(content.contains("Error: Batch parse failed"));
    }

    #[test]
    fn test_validate_with_rejections_is_an_error() {
        let mut input = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut input, include_bytes!("../fixtures/two_records.json")).unwrap();

        let err = cmd_validate(input.path(), &EtlConfig::default()).unwrap_err();
        assert!(err.to_string().contains("1 of 2 records failed validation"));
    }
}
