use crate::entities::{Day, EpochDay, Location, Tag};
use crate::error::{Error, Result};
use crate::infrastructure::storage::{
    EntityStore, EntityWriter, unknown_reference, validate_day, validate_location, validate_tag,
};
use crate::search::StoreQuery;
use async_trait::async_trait;
use chrono::Datelike;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Records {
    days: BTreeMap<EpochDay, Day>,
    locations: BTreeMap<i64, Location>,
    tags: BTreeMap<i64, Tag>,
}

/// Entity store kept entirely in memory. Queries are evaluated with the same
/// predicates as the quick pass.
pub struct MemoryStore {
    records: RwLock<Records>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Records::default()),
            available: AtomicBool::new(true),
        }
    }

    pub fn with_days(days: impl IntoIterator<Item = Day>) -> Self {
        let store = Self::new();
        if let Ok(mut records) = store.records.write() {
            for day in days {
                records.days.insert(day.id, day);
            }
        }
        store
    }

    /// While unavailable every call fails with [`Error::StoreUnavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Records>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable("memory store is offline".to_string()));
        }
        self.records
            .read()
            .map_err(|_| Error::StoreUnavailable("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Records>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable("memory store is offline".to_string()));
        }
        self.records
            .write()
            .map_err(|_| Error::StoreUnavailable("memory store lock poisoned".to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn newest_first(days: impl Iterator<Item = Day>) -> Vec<Day> {
    let mut days: Vec<Day> = days.collect();
    days.sort_by(|a, b| b.id.cmp(&a.id));
    days
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn list_days_by_year(&self, year: i32) -> Result<Vec<Day>> {
        let records = self.read()?;
        Ok(newest_first(
            records
                .days
                .values()
                .filter(|day| day.date().is_some_and(|date| date.year() == year))
                .cloned(),
        ))
    }

    async fn search_days(&self, query: &StoreQuery) -> Result<Vec<Day>> {
        let records = self.read()?;
        Ok(newest_first(
            records.days.values().filter(|day| query.matches(day)).cloned(),
        ))
    }

    async fn list_all_locations(&self) -> Result<Vec<Location>> {
        let records = self.read()?;
        let mut locations: Vec<Location> = records.locations.values().cloned().collect();
        locations.sort_by(|a, b| b.last_used.cmp(&a.last_used));
        Ok(locations)
    }

    async fn list_all_tags(&self) -> Result<Vec<Tag>> {
        let records = self.read()?;
        let mut tags: Vec<Tag> = records.tags.values().cloned().collect();
        tags.sort_by(|a, b| b.last_used.cmp(&a.last_used));
        Ok(tags)
    }
}

#[async_trait]
impl EntityWriter for MemoryStore {
    async fn upsert_location(&self, mut location: Location) -> Result<Location> {
        validate_location(&location)?;
        let mut records = self.write()?;

        if records
            .locations
            .values()
            .any(|existing| existing.id != location.id && existing.same_coordinates(&location))
        {
            return Err(Error::Conflict(format!(
                "a location already exists at ({}, {})",
                location.latitude, location.longitude
            )));
        }

        if location.id == 0 {
            location.id = records.locations.keys().next_back().copied().unwrap_or(0) + 1;
        } else if !records.locations.contains_key(&location.id) {
            return Err(unknown_reference("location", location.id));
        }
        records.locations.insert(location.id, location.clone());
        Ok(location)
    }

    async fn upsert_tag(&self, mut tag: Tag) -> Result<Tag> {
        validate_tag(&tag)?;
        let mut records = self.write()?;

        if records
            .tags
            .values()
            .any(|existing| existing.id != tag.id && existing.name == tag.name)
        {
            return Err(Error::Conflict(format!("tag '{}' already exists", tag.name)));
        }

        if tag.id == 0 {
            tag.id = records.tags.keys().next_back().copied().unwrap_or(0) + 1;
        } else if !records.tags.contains_key(&tag.id) {
            return Err(unknown_reference("tag", tag.id));
        }
        records.tags.insert(tag.id, tag.clone());
        Ok(tag)
    }

    async fn upsert_day(&self, mut day: Day) -> Result<()> {
        validate_day(&day)?;
        let mut records = self.write()?;

        if let Some(location) = &day.location {
            if !records.locations.contains_key(&location.id) {
                return Err(unknown_reference("location", location.id));
            }
        }
        if let Some(content_tag) = day
            .tags
            .iter()
            .find(|content_tag| !records.tags.contains_key(&content_tag.tag.id))
        {
            return Err(unknown_reference("tag", content_tag.tag.id));
        }

        let used_at = day.last_modified;
        if let Some(location) = &mut day.location {
            if let Some(stored) = records.locations.get_mut(&location.id) {
                stored.last_used = stored.last_used.max(used_at);
                *location = stored.clone();
            }
        }
        for content_tag in &mut day.tags {
            if let Some(stored) = records.tags.get_mut(&content_tag.tag.id) {
                stored.last_used = stored.last_used.max(used_at);
                content_tag.tag = stored.clone();
            }
        }

        records.days.insert(day.id, day);
        Ok(())
    }

    async fn delete_day(&self, id: EpochDay) -> Result<()> {
        let mut records = self.write()?;
        records.days.remove(&id);
        Ok(())
    }
}
