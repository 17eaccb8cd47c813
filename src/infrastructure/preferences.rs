use crate::entities::SearchHistory;
use crate::error::{Error, Result};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::sync::{Mutex, watch};

pub const DEFAULT_HISTORY_LIMIT: usize = 10;

/// User preferences consumed by the search engine.
#[async_trait]
pub trait Preferences: Send + Sync {
    /// Observable search history, most recent last.
    fn search_history(&self) -> watch::Receiver<SearchHistory>;

    /// Moves `text` to the end of the history, capping its length.
    async fn record_search(&self, text: &str) -> Result<()>;
}

/// Preferences that live only as long as the process.
pub struct MemoryPreferences {
    history: watch::Sender<SearchHistory>,
    limit: usize,
}

impl MemoryPreferences {
    pub fn new(limit: usize) -> Self {
        Self::with_history(SearchHistory::default(), limit)
    }

    pub fn with_history(history: SearchHistory, limit: usize) -> Self {
        let (history, _) = watch::channel(history);
        Self { history, limit }
    }
}

impl Default for MemoryPreferences {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

#[async_trait]
impl Preferences for MemoryPreferences {
    fn search_history(&self) -> watch::Receiver<SearchHistory> {
        self.history.subscribe()
    }

    async fn record_search(&self, text: &str) -> Result<()> {
        let limit = self.limit;
        self.history.send_if_modified(|history| {
            let updated = history.recorded(text, limit);
            let changed = updated != *history;
            *history = updated;
            changed
        });
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PreferencesFile {
    #[serde(default)]
    search_history: SearchHistory,
}

/// Preferences persisted as a JSON document.
pub struct JsonPreferences {
    path: PathBuf,
    limit: usize,
    history: watch::Sender<SearchHistory>,
    write_lock: Mutex<()>,
}

impl JsonPreferences {
    /// Loads preferences from `path`; a missing file starts out empty.
    pub fn open(path: impl Into<PathBuf>, limit: usize) -> Result<Self> {
        let path = path.into();
        let file = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str::<PreferencesFile>(&content)?
        } else {
            PreferencesFile::default()
        };

        // A lowered limit applies to what was stored before.
        let history = match file.search_history.entries().len() {
            len if len > limit => SearchHistory::from_entries(
                file.search_history.entries()[len - limit..].to_vec(),
            ),
            _ => file.search_history,
        };

        let (history, _) = watch::channel(history);
        Ok(Self {
            path,
            limit,
            history,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_atomically(path: &Path, file: &PreferencesFile) -> Result<()> {
    let dir = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut temp, file)?;
    temp.write_all(b"\n")?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

#[async_trait]
impl Preferences for JsonPreferences {
    fn search_history(&self) -> watch::Receiver<SearchHistory> {
        self.history.subscribe()
    }

    async fn record_search(&self, text: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let current = self.history.borrow().clone();
        let updated = current.recorded(text, self.limit);
        if updated == current {
            return Ok(());
        }

        let path = self.path.clone();
        let file = PreferencesFile {
            search_history: updated.clone(),
        };
        tokio::task::spawn_blocking(move || write_atomically(&path, &file))
            .await
            .map_err(|e| Error::StoreUnavailable(format!("preferences writer failed: {}", e)))??;

        debug!("Persisted search history to {}", self.path.display());
        self.history.send_replace(updated);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn memory_preferences_notify_on_change_only() {
        let preferences = MemoryPreferences::new(3);
        let mut history = preferences.search_history();

        preferences.record_search("beach").await.unwrap();
        assert!(history.has_changed().unwrap());
        history.borrow_and_update();

        preferences.record_search("").await.unwrap();
        assert!(!history.has_changed().unwrap());

        preferences.record_search("beach").await.unwrap();
        assert!(!history.has_changed().unwrap());
        assert_eq!(history.borrow().entries(), ["beach"]);
    }

    #[tokio::test]
    async fn json_preferences_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("preferences.json");

        let preferences = JsonPreferences::open(&path, 5).unwrap();
        for query in ["sun", "beach", "sun"] {
            preferences.record_search(query).await.unwrap();
        }
        assert!(path.exists());

        let reopened = JsonPreferences::open(&path, 5).unwrap();
        assert_eq!(reopened.search_history().borrow().entries(), ["beach", "sun"]);
        assert_eq!(reopened.path(), path.as_path());
    }

    #[tokio::test]
    async fn json_preferences_apply_lowered_limit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preferences.json");

        let preferences = JsonPreferences::open(&path, 10).unwrap();
        for query in ["a", "b", "c", "d"] {
            preferences.record_search(query).await.unwrap();
        }

        let reopened = JsonPreferences::open(&path, 2).unwrap();
        assert_eq!(reopened.search_history().borrow().entries(), ["c", "d"]);
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("preferences.json");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(JsonPreferences::open(&path, 5), Err(Error::Json(_))));
    }
}
