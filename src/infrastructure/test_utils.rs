/// Test utilities for DuckDB-based tests
///
/// This module provides a simple test harness that creates fresh DuckDB instances
/// for each test and automatically cleans them up. This ensures test isolation
/// without requiring complex rollback logic.
///
/// ## Usage Examples
///
/// ```rust,ignore
/// use crate::infrastructure::test_utils::test_harness::TestStorage;
///
/// #[tokio::test]
/// async fn my_test() {
///     let test_storage = TestStorage::new();
///     let seeded = test_storage.seed_sample_journal().await.unwrap();
///
///     // Use test_storage.storage() for testing...
///     // Database is automatically cleaned up when test_storage is dropped
/// }
/// ```
#[cfg(test)]
pub mod test_harness {
    use crate::entities::{ContentTag, Day, EpochDay, Location, LocationId, Tag, TagId};
    use crate::error::Result;
    use crate::infrastructure::{DuckDbStorage, EntityWriter};
    use chrono::NaiveDate;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Ids of the records created by [`TestStorage::seed_sample_journal`]
    #[derive(Debug, Clone, Copy)]
    pub struct SampleJournal {
        pub tokyo: LocationId,
        pub alps: LocationId,
        pub food: TagId,
        pub travel: TagId,
        pub hiking_day: EpochDay,
        pub ramen_day: EpochDay,
    }

    /// Test harness that creates a fresh DuckDB instance for each test
    /// and automatically cleans up when dropped
    pub struct TestStorage {
        pub storage: DuckDbStorage,
        _temp_dir: TempDir, // Keep temp dir alive
    }

    impl TestStorage {
        /// Create a new test storage instance with fresh DuckDB database
        pub fn new() -> Self {
            let temp_dir = TempDir::new().expect("Failed to create temp directory");
            let db_path = temp_dir.path().join("test.db");

            let storage =
                DuckDbStorage::new(&db_path).expect("Failed to initialize test DuckDB storage");

            Self {
                storage,
                _temp_dir: temp_dir,
            }
        }

        /// Get a reference to the DuckDB storage
        pub fn storage(&self) -> &DuckDbStorage {
            &self.storage
        }

        /// Get database path (useful for debugging)
        pub fn db_path(&self) -> PathBuf {
            self._temp_dir.path().join("test.db")
        }

        /// Seeds a small journal spanning 2023 and 2024 with two locations and two tags
        pub async fn seed_sample_journal(&self) -> Result<SampleJournal> {
            let tokyo = self
                .storage
                .upsert_location(Location::new(0, "Tokyo", 35.68, 139.69))
                .await?;
            let alps = self
                .storage
                .upsert_location(Location::new(0, "Alps", 46.55, 8.56))
                .await?;
            let food = self.storage.upsert_tag(Tag::new(0, "Food")).await?;
            let travel = self.storage.upsert_tag(Tag::new(0, "Travel")).await?;

            let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).expect("valid sample date");

            let hiking = Day::on(date(2024, 3, 10), "Hiking trip")
                .with_location(alps.clone())
                .with_tag(ContentTag::with_content(travel.clone(), "Train to Zermatt"));
            let ramen = Day::on(date(2024, 4, 2), "")
                .with_location(tokyo.clone())
                .with_tag(ContentTag::with_content(food.clone(), "Tried ramen"))
                .with_tag(ContentTag::new(travel.clone()));
            let quiet = Day::on(date(2024, 6, 1), "Quiet day at home").favorite();
            let old_trip = Day::on(date(2023, 8, 20), "Road trip, 100% worth it")
                .with_tag(ContentTag::with_content(food.clone(), "Roadside a_b diner"));

            let sample = SampleJournal {
                tokyo: tokyo.id,
                alps: alps.id,
                food: food.id,
                travel: travel.id,
                hiking_day: hiking.id,
                ramen_day: ramen.id,
            };

            for day in [hiking, ramen, quiet, old_trip] {
                self.storage.upsert_day(day).await?;
            }

            Ok(sample)
        }
    }

    /// Run a test with fresh test storage
    pub fn with_test_storage<F, R>(test_fn: F) -> R
    where
        F: FnOnce(&TestStorage) -> R,
    {
        let test_storage = TestStorage::new();
        test_fn(&test_storage)
    }
}

#[cfg(test)]
mod tests {
    use super::test_harness::*;
    use crate::infrastructure::{EntityStore, JournalStorage};
    use crate::search::StoreQuery;

    #[tokio::test]
    async fn test_harness_basic_functionality() {
        let test_storage = TestStorage::new();

        // Initially empty
        assert!(test_storage.storage().search_days(&StoreQuery::all()).await.unwrap().is_empty());

        test_storage.seed_sample_journal().await.unwrap();

        // Verify it's persisted
        let days = test_storage.storage().search_days(&StoreQuery::all()).await.unwrap();
        assert_eq!(days.len(), 4);
        assert!(test_storage.db_path().exists());
    }

    #[test]
    fn test_harness_with_function() {
        with_test_storage(|test_storage| {
            test_storage.storage().maintenance().unwrap();
        });
    }

    #[tokio::test]
    async fn test_harness_isolation() {
        // Each test gets a fresh database
        let test_storage1 = TestStorage::new();
        let test_storage2 = TestStorage::new();

        test_storage1.seed_sample_journal().await.unwrap();

        // Second storage should not see it
        assert!(test_storage2.storage().list_all_tags().await.unwrap().is_empty());
    }
}
