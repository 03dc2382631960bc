//! Diagnostics of the tool itself, as opposed to the user facing session log.

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use anyhow::Context;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter as TracingLevel;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// What the JSON log file records, independent of the terminal level.
const FILE_DIRECTIVES: &str = "info,esc_unlocker=debug";

/// Flushes the JSON log file when dropped.
pub struct LogFileGuard {
    _worker: WorkerGuard,
    path: PathBuf,
}

impl Drop for LogFileGuard {
    fn drop(&mut self) {
        tracing::info!("Diagnostics written to {}", self.path.display());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[clap(rename_all = "UPPER")]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum LevelFilter {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl TryFrom<String> for LevelFilter {
    type Error = String;

    fn try_from(value: String) -> Result<Self, <Self as TryFrom<String>>::Error> {
        <Self as ValueEnum>::from_str(value.trim(), true)
            .map_err(|_| format!("'{value}' is not a log level"))
    }
}

impl From<LevelFilter> for TracingLevel {
    fn from(level: LevelFilter) -> Self {
        match level {
            LevelFilter::Off => TracingLevel::OFF,
            LevelFilter::Error => TracingLevel::ERROR,
            LevelFilter::Warn => TracingLevel::WARN,
            LevelFilter::Info => TracingLevel::INFO,
            LevelFilter::Debug => TracingLevel::DEBUG,
            LevelFilter::Trace => TracingLevel::TRACE,
        }
    }
}

/// An explicit level wins over `RUST_LOG`, which wins over WARN.
fn terminal_filter(level: Option<LevelFilter>) -> EnvFilter {
    match level {
        Some(level) => EnvFilter::builder()
            .with_default_directive(TracingLevel::from(level).into())
            .parse_lossy(""),
        None => EnvFilter::builder()
            .with_default_directive(TracingLevel::WARN.into())
            .from_env_lossy(),
    }
}

fn file_writer(path: &Path) -> anyhow::Result<(NonBlocking, WorkerGuard)> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create the log file {}.", path.display()))?;

    Ok(tracing_appender::non_blocking::NonBlockingBuilder::default()
        .lossy(false)
        .finish(file))
}

/// Installs the global subscriber: compact lines on stderr, plus a JSON file
/// when `log_file` is given. Keep the returned guard alive until exit.
pub fn setup_logging(
    log_file: Option<&Path>,
    level: Option<LevelFilter>,
) -> anyhow::Result<Option<LogFileGuard>> {
    let terminal = tracing_subscriber::fmt::layer()
        .compact()
        .without_time()
        .with_writer(std::io::stderr)
        .with_filter(terminal_filter(level));

    let (file, guard) = match log_file {
        Some(path) => {
            let (writer, worker) = file_writer(path)?;
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(writer)
                .with_filter(EnvFilter::new(FILE_DIRECTIVES));
            let guard = LogFileGuard {
                _worker: worker,
                path: path.to_path_buf(),
            };
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(terminal)
        .with(file)
        .try_init()
        .context("A global logger is already installed.")?;

    if let Some(path) = log_file {
        tracing::info!("Writing diagnostics to {}", path.display());
    }

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::*;

    #[test_case(LevelFilter::Off, TracingLevel::OFF)]
    #[test_case(LevelFilter::Warn, TracingLevel::WARN)]
    #[test_case(LevelFilter::Trace, TracingLevel::TRACE)]
    fn maps_to_tracing_levels(level: LevelFilter, expected: TracingLevel) {
        assert_eq!(TracingLevel::from(level), expected);
    }

    #[test]
    fn explicit_level_overrides_environment() {
        let filter = terminal_filter(Some(LevelFilter::Debug));

        assert_eq!(filter.max_level_hint(), Some(TracingLevel::DEBUG));
    }

    #[test_case("debug", LevelFilter::Debug)]
    #[test_case("Info", LevelFilter::Info)]
    #[test_case("TRACE", LevelFilter::Trace)]
    fn level_names_ignore_case(name: &str, expected: LevelFilter) {
        assert_eq!(LevelFilter::try_from(name.to_string()), Ok(expected));
    }

    #[test]
    fn unknown_level_is_rejected() {
        assert!(LevelFilter::try_from("loud".to_string()).is_err());
    }

    #[test]
    fn file_records_debug_of_this_crate_only() {
        let filter = EnvFilter::new(FILE_DIRECTIVES);

        assert_eq!(filter.max_level_hint(), Some(TracingLevel::DEBUG));
    }

    #[test]
    fn log_file_in_missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();

        let error = file_writer(&dir.path().join("missing").join("log.json")).unwrap_err();

        assert!(error.to_string().contains("log.json"), "{error}");
    }
}
