use crate::entities::{Day, EpochDay, Location, Tag};
use crate::error::{Error, Result};
use std::collections::BTreeSet;
use crate::search::StoreQuery;
use async_trait::async_trait;

/// Read side of the entity store, the only part the search engine sees.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Days of one calendar year, newest first
    async fn list_days_by_year(&self, year: i32) -> Result<Vec<Day>>;

    /// Days matching a store query, newest first
    async fn search_days(&self, query: &StoreQuery) -> Result<Vec<Day>>;

    /// Locations, most recently used first
    async fn list_all_locations(&self) -> Result<Vec<Location>>;

    /// Tags, most recently used first
    async fn list_all_tags(&self) -> Result<Vec<Tag>>;
}

/// Write side of the entity store.
#[async_trait]
pub trait EntityWriter: Send + Sync {
    /// Inserts a location (id 0 allocates a new id) or replaces an existing one.
    /// Returns the stored location. Duplicate coordinates are rejected, and so
    /// is a non-zero id the store does not know.
    async fn upsert_location(&self, location: Location) -> Result<Location>;

    /// Inserts a tag (id 0 allocates a new id) or replaces an existing one.
    /// Duplicate names and unknown non-zero ids are rejected.
    async fn upsert_tag(&self, tag: Tag) -> Result<Tag>;

    /// Inserts or replaces a day together with its tag associations. The
    /// location and every tag must already exist; their `last_used` moves up
    /// to the day's `last_modified`.
    async fn upsert_day(&self, day: Day) -> Result<()>;

    async fn delete_day(&self, id: EpochDay) -> Result<()>;
}

/// Combined storage interface for a concrete backend
pub trait JournalStorage: EntityStore + EntityWriter {
    /// Initialize the storage backend (create tables, indexes, etc.)
    fn initialize(&self) -> Result<()>;

    /// Get storage backend information
    fn backend_info(&self) -> &str;

    /// Perform maintenance operations (vacuum, optimize, etc.)
    fn maintenance(&self) -> Result<()>;
}

/// Rejects days whose id is not a calendar date or that attach the same tag twice.
pub(crate) fn validate_day(day: &Day) -> Result<()> {
    if day.date().is_none() {
        return Err(Error::InvalidInput(format!(
            "day id {} is not a valid date",
            day.id
        )));
    }

    let mut seen = BTreeSet::new();
    for content_tag in &day.tags {
        if !seen.insert(content_tag.tag.id) {
            return Err(Error::InvalidInput(format!(
                "day {} attaches tag {} more than once",
                day.id, content_tag.tag.id
            )));
        }
    }
    Ok(())
}

/// Rejects locations without a name.
pub(crate) fn validate_location(location: &Location) -> Result<()> {
    if location.name.trim().is_empty() {
        return Err(Error::InvalidInput(
            "location name must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Rejects tags without a name.
pub(crate) fn validate_tag(tag: &Tag) -> Result<()> {
    if tag.name.trim().is_empty() {
        return Err(Error::InvalidInput("tag name must not be empty".to_string()));
    }
    Ok(())
}

/// Error for a reference to a location or tag that is not stored.
pub(crate) fn unknown_reference(kind: &str, id: i64) -> Error {
    Error::InvalidInput(format!("unknown {} id {}", kind, id))
}
