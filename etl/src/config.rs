//! Run configuration.
//!
//! Values come from defaults, then a `.env` file (via `dotenvy`), then the
//! process environment. CLI flags override on top in `main.rs`.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `JSON_INPUT_FILE` | `data/properties.json` |
//! | `DB_PATH` | `home_db.sqlite` |
//! | `DB_BUSY_TIMEOUT_MS` | `5000` |
//! | `LOG_LEVEL` | `info` |
//! | `LOG_FILE` | unset |
//! | `BATCH_SIZE` | `1000` |
//! | `CHUNK_SIZE` | `0` (whole batch) |
//! | `MAX_RECORDS` | `0` (unlimited) |
//! | `SKIP_INVALID` | `true` |

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::logs::{log_info, log_info_indent};

/// Connection settings for the relational store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("home_db.sqlite"),
            busy_timeout_ms: 5000,
        }
    }
}

/// Settings for one ETL run.
#[derive(Debug, Clone, PartialEq)]
pub struct EtlConfig {
    pub input_file: PathBuf,
    pub store: StoreConfig,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    /// Rows per insert transaction.
    pub batch_size: usize,
    /// Records per load chunk; 0 loads the whole batch at once.
    pub chunk_size: usize,
    /// 0 means no limit.
    pub max_records: usize,
    pub skip_invalid: bool,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            input_file: PathBuf::from("data/properties.json"),
            store: StoreConfig::default(),
            log_level: "info".to_string(),
            log_file: None,
            batch_size: 1000,
            chunk_size: 0,
            max_records: 0,
            skip_invalid: true,
        }
    }
}

impl EtlConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("JSON_INPUT_FILE") {
            config.input_file = PathBuf::from(v);
        }
        if let Some(v) = get("DB_PATH") {
            config.store.path = PathBuf::from(v);
        }
        if let Some(v) = get("DB_BUSY_TIMEOUT_MS") {
            config.store.busy_timeout_ms = parse_number("DB_BUSY_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("LOG_LEVEL") {
            config.log_level = v.to_lowercase();
        }
        if let Some(v) = get("LOG_FILE") {
            config.log_file = Some(PathBuf::from(v));
        }
        if let Some(v) = get("BATCH_SIZE") {
            config.batch_size = parse_number("BATCH_SIZE", &v)?;
            if config.batch_size == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "BATCH_SIZE".to_string(),
                    value: v,
                    expected: "a positive integer",
                });
            }
        }
        if let Some(v) = get("CHUNK_SIZE") {
            config.chunk_size = parse_number("CHUNK_SIZE", &v)?;
        }
        if let Some(v) = get("MAX_RECORDS") {
            config.max_records = parse_number("MAX_RECORDS", &v)?;
        }
        if let Some(v) = get("SKIP_INVALID") {
            config.skip_invalid = parse_bool("SKIP_INVALID", &v)?;
        }

        Ok(config)
    }

    /// Effective settings as `(variable, value)` pairs, in table order.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        let or_unset = |p: &Option<PathBuf>| {
            p.as_ref()
                .map_or_else(|| "(unset)".to_string(), |p| p.display().to_string())
        };
        vec![
            ("JSON_INPUT_FILE", self.input_file.display().to_string()),
            ("DB_PATH", self.store.path.display().to_string()),
            ("DB_BUSY_TIMEOUT_MS", self.store.busy_timeout_ms.to_string()),
            ("LOG_LEVEL", self.log_level.clone()),
            ("LOG_FILE", or_unset(&self.log_file)),
            ("BATCH_SIZE", self.batch_size.to_string()),
            ("CHUNK_SIZE", self.chunk_size.to_string()),
            ("MAX_RECORDS", self.max_records.to_string()),
            ("SKIP_INVALID", self.skip_invalid.to_string()),
        ]
    }

    /// Log the effective settings, one per line.
    pub fn log(&self) {
        log_info("Configuration:");
        for (key, value) in self.entries() {
            log_info_indent(format!("{}: {}", key, value), 1);
        }
    }

    /// `max_records` as an optional limit.
    pub fn record_limit(&self) -> Option<usize> {
        (self.max_records > 0).then_some(self.max_records)
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        expected: "a non-negative integer",
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            expected: "true or false",
        }),
    }
}
