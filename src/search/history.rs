use crate::entities::SearchHistory;
use crate::error::Result;
use crate::infrastructure::Preferences;
use log::debug;
use std::sync::Arc;
use tokio::sync::watch;

/// Records accepted search strings through the injected preferences.
#[derive(Clone)]
pub struct HistoryTracker {
    preferences: Arc<dyn Preferences>,
}

impl HistoryTracker {
    pub fn new(preferences: Arc<dyn Preferences>) -> Self {
        Self { preferences }
    }

    /// No-op for an empty query.
    pub async fn record(&self, query: &str) -> Result<()> {
        if query.is_empty() {
            return Ok(());
        }
        debug!("Recording search '{}'", query);
        self.preferences.record_search(query).await
    }

    /// Most recent last.
    pub fn list(&self) -> Vec<String> {
        self.preferences.search_history().borrow().entries().to_vec()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchHistory> {
        self.preferences.search_history()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::MemoryPreferences;

    fn tracker(limit: usize) -> HistoryTracker {
        HistoryTracker::new(Arc::new(MemoryPreferences::new(limit)))
    }

    #[tokio::test]
    async fn empty_query_never_changes_history() {
        let tracker = tracker(5);
        tracker.record("sun").await.unwrap();
        tracker.record("").await.unwrap();
        assert_eq!(tracker.list(), vec!["sun"]);
    }

    #[tokio::test]
    async fn repeated_query_keeps_length() {
        let tracker = tracker(5);
        tracker.record("sun").await.unwrap();
        tracker.record("beach").await.unwrap();
        tracker.record("beach").await.unwrap();

        let history = tracker.list();
        assert_eq!(history.len(), 2);
        assert_eq!(history.last().map(String::as_str), Some("beach"));
    }

    #[tokio::test]
    async fn history_is_capped() {
        let tracker = tracker(2);
        for query in ["one", "two", "three"] {
            tracker.record(query).await.unwrap();
        }
        assert_eq!(tracker.list(), vec!["two", "three"]);
        assert_eq!(tracker.subscribe().borrow().most_recent_first(), vec!["three", "two"]);
    }
}
