use crate::application::Config;
use anyhow::{Context, Result, anyhow};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Routes every `log` record to `config.log_path` through a non-blocking
/// writer. Records are flushed when the returned guard is dropped, so keep it
/// alive for the lifetime of the process.
pub fn init_logging(config: &Config) -> Result<WorkerGuard> {
    let log_dir = config
        .log_path
        .parent()
        .context("Log path has no parent directory")?;
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let file_name = config
        .log_path
        .file_name()
        .context("Log path has no file name")?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::default().add_directive(config.log_level.into()))
        .with_writer(non_blocking)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow!("Failed to install logger: {}", e))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tracing_subscriber::filter::LevelFilter;

    // Installs the process-wide subscriber; no other test may call init_logging.
    #[test]
    fn log_records_reach_the_journal_log() {
        let dir = TempDir::new().unwrap();
        let config = Config::for_dir(dir.path().join("journal"), 5, LevelFilter::INFO);

        let guard = init_logging(&config).unwrap();
        log::warn!("search store went offline");
        log::debug!("filtered out below info");
        drop(guard);

        let written = std::fs::read_to_string(&config.log_path).unwrap();
        assert!(written.contains("WARN"));
        assert!(written.contains("search store went offline"));
        assert!(!written.contains("filtered out below info"));
    }
}
