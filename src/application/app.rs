use crate::application::Config;
use crate::entities::{ContentTag, Day, Filters, Location, SearchRequest, Tag, TagId, epoch_day};
use crate::infrastructure::{
    DuckDbStorage, EntityStore, EntityWriter, JsonPreferences, JournalStorage, Preferences,
};
use crate::search::{HistoryTracker, QueryBuilder, SearchSession, SearchUiState, StoreQuery};
use anyhow::{Context, Result, bail};
use chrono::{NaiveDate, Utc};
use log::info;
use std::sync::Arc;

/// Wires the persistent store and preferences to search sessions.
pub struct SearchApp {
    config: Config,
    storage: Arc<DuckDbStorage>,
    preferences: Arc<JsonPreferences>,
}

impl SearchApp {
    pub fn open(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.journal_dir).with_context(|| {
            format!("Failed to create journal directory {}", config.journal_dir.display())
        })?;

        let storage = DuckDbStorage::new(&config.database_path)
            .context("Failed to initialize DuckDB storage")?;
        let preferences = JsonPreferences::open(&config.preferences_path, config.history_limit)
            .context("Failed to load preferences")?;
        info!("Opened journal at {} ({})", config.journal_dir.display(), storage.backend_info());

        Ok(Self {
            config,
            storage: Arc::new(storage),
            preferences: Arc::new(preferences),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn start_session(&self) -> SearchSession {
        let tracker = HistoryTracker::new(self.preferences.clone());
        SearchSession::start(self.storage.clone(), tracker, QueryBuilder::for_today()).await
    }

    /// Runs one full search the way a search screen would and returns the final state.
    pub async fn run_search(&self, request: SearchRequest) -> Result<SearchUiState> {
        let session = self.start_session().await;

        // Filters first: with no text yet this does not hit the store.
        session.set_filters(request.filters).await;
        session.set_search_text(request.text);
        session.search().await;

        let state = session.state();
        if let Some(message) = state.full_results.error() {
            bail!("Search failed: {}", message);
        }
        Ok(state)
    }

    /// Most recent first.
    pub fn history(&self) -> Vec<String> {
        self.preferences.search_history().borrow().most_recent_first()
    }

    pub async fn options(&self) -> Result<(Vec<Location>, Vec<Tag>)> {
        let locations = self.storage.list_all_locations().await?;
        let tags = self.storage.list_all_tags().await?;
        Ok((locations, tags))
    }

    pub async fn add_location(&self, name: &str, latitude: f64, longitude: f64) -> Result<Location> {
        let location = self
            .storage
            .upsert_location(Location::new(0, name, latitude, longitude))
            .await
            .with_context(|| format!("Failed to store location '{}'", name))?;
        Ok(location)
    }

    pub async fn add_tag(&self, name: &str) -> Result<Tag> {
        let tag = self
            .storage
            .upsert_tag(Tag::new(0, name))
            .await
            .with_context(|| format!("Failed to store tag '{}'", name))?;
        Ok(tag)
    }

    /// Creates or replaces the entry for `date`, resolving location and tag ids.
    /// A replaced entry keeps its original creation time.
    pub async fn write_day(
        &self,
        date: NaiveDate,
        summary: &str,
        favorite: bool,
        location_id: Option<i64>,
        tags: &[(TagId, Option<String>)],
    ) -> Result<Day> {
        let (locations, known_tags) = self.options().await?;

        let mut day = Day::on(date, summary);
        day.favorite = favorite;
        day.last_modified = Utc::now();
        if let Some(existing) = self.stored_day(date).await? {
            day.created = existing.created;
        }

        if let Some(id) = location_id {
            let location = locations
                .into_iter()
                .find(|location| location.id == id)
                .with_context(|| format!("Unknown location id {}", id))?;
            day = day.with_location(location);
        }

        for (tag_id, content) in tags {
            let tag = known_tags
                .iter()
                .find(|tag| tag.id == *tag_id)
                .cloned()
                .with_context(|| format!("Unknown tag id {}", tag_id))?;
            day = day.with_tag(ContentTag {
                tag,
                content: content.clone(),
            });
        }

        self.storage
            .upsert_day(day.clone())
            .await
            .with_context(|| format!("Failed to store entry for {}", date))?;
        Ok(day)
    }

    async fn stored_day(&self, date: NaiveDate) -> Result<Option<Day>> {
        let id = epoch_day(date);
        let query = StoreQuery {
            start_day: Some(id),
            end_day: Some(id),
            ..StoreQuery::all()
        };
        Ok(self.storage.search_days(&query).await?.into_iter().next())
    }

    /// Runs DuckDB maintenance.
    pub fn maintenance(&self) -> Result<()> {
        self.storage.maintenance().context("Failed to perform maintenance operations")
    }
}

/// Builds the filter set for one CLI search.
pub fn filters_from_parts(
    date: crate::entities::DateFilter,
    locations: &[i64],
    tags: &[i64],
) -> Filters {
    Filters {
        date,
        locations: locations.iter().copied().collect(),
        tags: tags.iter().copied().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::DateFilter;
    use tracing_subscriber::filter::LevelFilter;
    use tempfile::TempDir;

    fn open_app(dir: &TempDir) -> SearchApp {
        let config = Config::for_dir(dir.path().join("journal"), 5, LevelFilter::INFO);
        SearchApp::open(config).unwrap()
    }

    #[tokio::test]
    async fn written_days_are_found_and_history_persists() {
        let dir = TempDir::new().unwrap();
        let app = open_app(&dir);

        let beach = app.add_location("Beach", 43.3, -1.9).await.unwrap();
        let food = app.add_tag("Food").await.unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 7, 14).unwrap();
        app.write_day(date, "Surfing", true, Some(beach.id), &[(food.id, Some("Grilled sardines".into()))])
            .await
            .unwrap();

        let request = SearchRequest::new("sardines")
            .with_filters(filters_from_parts(DateFilter::Any, &[beach.id], &[]));
        let state = app.run_search(request).await.unwrap();

        let days = state.full_results.data().unwrap();
        assert_eq!(days.len(), 1);
        assert!(days[0].favorite);
        assert_eq!(app.history(), vec!["sardines"]);

        drop(app);
        let reopened = open_app(&dir);
        assert_eq!(reopened.history(), vec!["sardines"]);
        assert!(reopened.config().database_path.exists());
    }

    #[tokio::test]
    async fn rewriting_a_day_keeps_its_creation_time() {
        let dir = TempDir::new().unwrap();
        let app = open_app(&dir);
        let date = NaiveDate::from_ymd_opt(2024, 7, 14).unwrap();

        let first = app.write_day(date, "Draft", false, None, &[]).await.unwrap();
        let second = app.write_day(date, "Final", true, None, &[]).await.unwrap();
        assert_eq!(second.created.timestamp_millis(), first.created.timestamp_millis());

        let stored = app.stored_day(date).await.unwrap().unwrap();
        assert_eq!(stored.summary, "Final");
        assert_eq!(stored.created.timestamp_millis(), first.created.timestamp_millis());
    }

    #[tokio::test]
    async fn write_day_rejects_unknown_ids() {
        let dir = TempDir::new().unwrap();
        let app = open_app(&dir);
        let date = NaiveDate::from_ymd_opt(2024, 7, 14).unwrap();

        assert!(app.write_day(date, "x", false, Some(99), &[]).await.is_err());
        assert!(app.write_day(date, "x", false, None, &[(3, None)]).await.is_err());
        app.maintenance().unwrap();
    }
}
