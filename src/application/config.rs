use crate::infrastructure::DEFAULT_HISTORY_LIMIT;
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;

pub struct Config {
    pub journal_dir: PathBuf,
    pub database_path: PathBuf,
    pub preferences_path: PathBuf,
    pub log_path: PathBuf,
    pub history_limit: usize,
    pub log_level: LevelFilter,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let journal_dir = std::env::var("JOURNAL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_local_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("daybook")
            });

        let history_limit = match std::env::var("DAYBOOK_HISTORY_LIMIT") {
            Ok(value) => value
                .parse::<usize>()
                .ok()
                .filter(|limit| *limit > 0)
                .with_context(|| format!("DAYBOOK_HISTORY_LIMIT must be a positive integer, got '{}'", value))?,
            Err(_) => DEFAULT_HISTORY_LIMIT,
        };

        let log_level = match std::env::var("DAYBOOK_LOG") {
            Ok(value) => parse_log_level(&value)?,
            Err(_) => LevelFilter::INFO,
        };

        Ok(Self::for_dir(journal_dir, history_limit, log_level))
    }

    pub fn for_dir(journal_dir: PathBuf, history_limit: usize, log_level: LevelFilter) -> Self {
        Self {
            database_path: journal_dir.join("journal.db"),
            preferences_path: journal_dir.join("preferences.json"),
            log_path: journal_dir.join("daybook.log"),
            journal_dir,
            history_limit,
            log_level,
        }
    }
}

/// Accepts `off`, `error`, `warn`, `info`, `debug` or `trace`.
fn parse_log_level(value: &str) -> Result<LevelFilter> {
    value
        .trim()
        .parse::<LevelFilter>()
        .with_context(|| format!("DAYBOOK_LOG is not a log level: '{}'", value))
}
