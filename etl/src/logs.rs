//! Pipeline logging.
//!
//! Leveled helpers used across the pipeline, emitted through `tracing` so the
//! subscriber set up by [`init_logging`] decides where they go.

use std::io;
use std::path::Path;

use tracing::{error, info, warn};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber: console on stderr, plus `log_file` if set.
///
/// `RUST_LOG` wins over `level` when present. The returned guard flushes the
/// file writer on drop and must be kept alive for the whole run. If the log
/// file cannot be opened, logging continues on the console with a warning.
pub fn init_logging(level: &str, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let (file, file_error) = match log_file.map(file_writer) {
        Some(Ok(file)) => (Some(file), None),
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };
    let (writer, guard) = file.unzip();
    let file_layer = writer.map(|w| fmt::layer().with_ansi(false).with_writer(w));

    // A subscriber may already be installed (tests, embedding)
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();

    if let (Some(path), Some(e)) = (log_file, file_error) {
        log_warning(format!(
            "Cannot write log file {}: {} (console only)",
            path.display(),
            e
        ));
    }

    guard
}

/// Non-blocking writer appending to `path`, creating its directory.
pub fn file_writer(path: &Path) -> io::Result<(NonBlocking, WorkerGuard)> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "home-etl.log".to_string());
    std::fs::create_dir_all(dir)?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(dir)
        .map_err(io::Error::other)?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Convenient logging functions
pub fn log_info(msg: impl Into<String>) {
    info!("{}", msg.into());
}

pub fn log_success(msg: impl Into<String>) {
    info!("✓ {}", msg.into());
}

pub fn log_warning(msg: impl Into<String>) {
    warn!("{}", msg.into());
}

pub fn log_error(msg: impl Into<String>) {
    error!("{}", msg.into());
}

pub fn log_info_indent(msg: impl Into<String>, indent: u8) {
    info!("{}{}", "   ".repeat(indent as usize), msg.into());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_writer_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("etl.log");

        let (mut writer, guard) = file_writer(&path).unwrap();
        writer.write_all(b"[FAILED] EXTRACTING failed\n").unwrap();
        drop(guard);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("[FAILED] EXTRACTING failed"));
    }

    #[test]
    fn test_file_writer_reports_unusable_directory() {
        let blocker = tempfile::NamedTempFile::new().unwrap();
        // The parent "directory" is a regular file
        let path = blocker.path().join("etl.log");

        assert!(file_writer(&path).is_err());
    }
}
