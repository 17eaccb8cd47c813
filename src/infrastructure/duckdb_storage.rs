use crate::entities::{ContentTag, Day, EpochDay, Location, Tag, epoch_day};
use crate::error::{Error, Result};
use crate::infrastructure::storage::{
    EntityStore, EntityWriter, JournalStorage, unknown_reference, validate_day,
    validate_location, validate_tag,
};
use crate::search::StoreQuery;
use crate::search::matcher::text_matches;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use duckdb::types::Value;
use duckdb::{Connection, OptionalExt, params, params_from_iter};
use log::{debug, info};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Numbered schema migrations, applied in order.
const MIGRATIONS: &[(i32, &str, &str)] = &[(
    1,
    "001_initial_schema",
    include_str!("../../migrations/001_initial_schema.sql"),
)];

const DAY_COLUMNS: &str = "d.id, d.summary, d.favorite, d.created_at, d.last_modified, \
     l.id, l.name, l.latitude, l.longitude, l.last_used";

struct SharedConnection(Mutex<Connection>);

// Mark SharedConnection as Send + Sync since every access goes through the Mutex
unsafe impl Send for SharedConnection {}
unsafe impl Sync for SharedConnection {}

pub struct DuckDbStorage {
    conn: Arc<SharedConnection>,
}

impl DuckDbStorage {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref()).map_err(|e| {
            Error::StoreUnavailable(format!(
                "failed to open DuckDB at {}: {}",
                db_path.as_ref().display(),
                e
            ))
        })?;

        let storage = Self::from_connection(conn);
        storage.initialize()?;
        Ok(storage)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            Error::StoreUnavailable(format!("failed to create in-memory DuckDB: {}", e))
        })?;

        let storage = Self::from_connection(conn);
        storage.initialize()?;
        Ok(storage)
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(SharedConnection(Mutex::new(conn))),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        lock_connection(&self.conn)
    }

    /// Runs blocking DuckDB work off the async executor.
    async fn with_connection<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let shared = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = lock_connection(&shared)?;
            work(&mut conn)
        })
        .await
        .map_err(|e| Error::StoreUnavailable(format!("DuckDB worker failed: {}", e)))?
    }
}

fn lock_connection(shared: &SharedConnection) -> Result<MutexGuard<'_, Connection>> {
    shared
        .0
        .lock()
        .map_err(|_| Error::StoreUnavailable("DuckDB connection lock poisoned".to_string()))
}

impl JournalStorage for DuckDbStorage {
    fn initialize(&self) -> Result<()> {
        self.setup_migration_system()?;
        self.run_migrations()?;
        Ok(())
    }

    fn backend_info(&self) -> &str {
        "DuckDB Storage Backend v1.0"
    }

    fn maintenance(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch("VACUUM; ANALYZE;")?;
        Ok(())
    }
}

#[async_trait]
impl EntityStore for DuckDbStorage {
    async fn list_days_by_year(&self, year: i32) -> Result<Vec<Day>> {
        let (first, last) = match (
            NaiveDate::from_ymd_opt(year, 1, 1),
            NaiveDate::from_ymd_opt(year, 12, 31),
        ) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(Error::InvalidInput(format!("year {} is out of range", year))),
        };

        let query = StoreQuery {
            start_day: Some(epoch_day(first)),
            end_day: Some(epoch_day(last)),
            ..StoreQuery::all()
        };
        self.search_days(&query).await
    }

    async fn search_days(&self, query: &StoreQuery) -> Result<Vec<Day>> {
        let query = query.clone();
        self.with_connection(move |conn| {
            let (sql, values) = render_search(&query);
            debug!("Running day search: {} with {} parameters", sql, values.len());

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values), read_day_row)?;

            let mut days = Vec::new();
            for day in rows {
                days.push(day?);
            }
            drop(stmt);

            for day in &mut days {
                day.tags = load_content_tags(conn, day.id)?;
            }
            days.retain(|day| text_matches(day, query.text.as_deref()));
            Ok(days)
        })
        .await
    }

    async fn list_all_locations(&self) -> Result<Vec<Location>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, latitude, longitude, last_used FROM locations \
                 ORDER BY last_used DESC, id",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(Location {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    latitude: row.get(2)?,
                    longitude: row.get(3)?,
                    last_used: from_millis(row.get(4)?),
                })
            })?;

            let mut locations = Vec::new();
            for location in rows {
                locations.push(location?);
            }
            Ok(locations)
        })
        .await
    }

    async fn list_all_tags(&self) -> Result<Vec<Tag>> {
        self.with_connection(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, name, last_used FROM tags ORDER BY last_used DESC, id")?;
            let rows = stmt.query_map([], |row| {
                Ok(Tag {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    last_used: from_millis(row.get(2)?),
                })
            })?;

            let mut tags = Vec::new();
            for tag in rows {
                tags.push(tag?);
            }
            Ok(tags)
        })
        .await
    }
}

#[async_trait]
impl EntityWriter for DuckDbStorage {
    async fn upsert_location(&self, location: Location) -> Result<Location> {
        validate_location(&location)?;
        self.with_connection(move |conn| {
            let duplicate: Option<i64> = conn
                .query_row(
                    "SELECT id FROM locations WHERE latitude = ? AND longitude = ? AND id <> ?",
                    params![location.latitude, location.longitude, location.id],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(existing) = duplicate {
                return Err(Error::Conflict(format!(
                    "location {} already exists at ({}, {})",
                    existing, location.latitude, location.longitude
                )));
            }

            let last_used = location.last_used.timestamp_millis();
            let updated = if location.id == 0 {
                0
            } else {
                conn.execute(
                    "UPDATE locations SET name = ?, latitude = ?, longitude = ?, last_used = ? \
                     WHERE id = ?",
                    params![
                        location.name,
                        location.latitude,
                        location.longitude,
                        last_used,
                        location.id
                    ],
                )?
            };

            if updated > 0 {
                return Ok(location);
            }
            if location.id != 0 {
                return Err(unknown_reference("location", location.id));
            }

            let id: i64 = conn.query_row(
                "INSERT INTO locations (name, latitude, longitude, last_used) \
                 VALUES (?, ?, ?, ?) RETURNING id",
                params![location.name, location.latitude, location.longitude, last_used],
                |row| row.get(0),
            )?;

            info!("Stored location {} '{}'", id, location.name);
            Ok(Location { id, ..location })
        })
        .await
    }

    async fn upsert_tag(&self, tag: Tag) -> Result<Tag> {
        validate_tag(&tag)?;
        self.with_connection(move |conn| {
            let duplicate: Option<i64> = conn
                .query_row(
                    "SELECT id FROM tags WHERE name = ? AND id <> ?",
                    params![tag.name, tag.id],
                    |row| row.get(0),
                )
                .optional()?;
            if duplicate.is_some() {
                return Err(Error::Conflict(format!("tag '{}' already exists", tag.name)));
            }

            let last_used = tag.last_used.timestamp_millis();
            let updated = if tag.id == 0 {
                0
            } else {
                conn.execute(
                    "UPDATE tags SET name = ?, last_used = ? WHERE id = ?",
                    params![tag.name, last_used, tag.id],
                )?
            };

            if updated > 0 {
                return Ok(tag);
            }
            if tag.id != 0 {
                return Err(unknown_reference("tag", tag.id));
            }

            let id: i64 = conn.query_row(
                "INSERT INTO tags (name, last_used) VALUES (?, ?) RETURNING id",
                params![tag.name, last_used],
                |row| row.get(0),
            )?;

            info!("Stored tag {} '{}'", id, tag.name);
            Ok(Tag { id, ..tag })
        })
        .await
    }

    async fn upsert_day(&self, day: Day) -> Result<()> {
        validate_day(&day)?;
        self.with_connection(move |conn| {
            if let Some(location) = &day.location {
                ensure_exists(conn, "location", location.id)?;
            }
            for content_tag in &day.tags {
                ensure_exists(conn, "tag", content_tag.tag.id)?;
            }

            let modified = day.last_modified.timestamp_millis();
            let tx = conn.transaction()?;

            tx.execute(
                r#"
                INSERT OR REPLACE INTO days (
                    id, summary, favorite, created_at, last_modified, location_id
                ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
                params![
                    day.id,
                    day.summary,
                    day.favorite,
                    day.created.timestamp_millis(),
                    modified,
                    day.location.as_ref().map(|location| location.id)
                ],
            )?;

            tx.execute("DELETE FROM day_tags WHERE day_id = ?", params![day.id])?;
            for (position, content_tag) in day.tags.iter().enumerate() {
                tx.execute(
                    "INSERT INTO day_tags (day_id, tag_id, position, content) VALUES (?, ?, ?, ?)",
                    params![
                        day.id,
                        content_tag.tag.id,
                        position as i32,
                        content_tag.content
                    ],
                )?;
                tx.execute(
                    "UPDATE tags SET last_used = greatest(last_used, ?) WHERE id = ?",
                    params![modified, content_tag.tag.id],
                )?;
            }

            if let Some(location) = &day.location {
                tx.execute(
                    "UPDATE locations SET last_used = greatest(last_used, ?) WHERE id = ?",
                    params![modified, location.id],
                )?;
            }

            tx.commit()?;
            debug!("Stored day {} with {} tags", day.id, day.tags.len());
            Ok(())
        })
        .await
    }

    async fn delete_day(&self, id: EpochDay) -> Result<()> {
        self.with_connection(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM day_tags WHERE day_id = ?", params![id])?;
            tx.execute("DELETE FROM days WHERE id = ?", params![id])?;
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

/// Renders the structured predicates of a store query into SQL plus
/// positional parameters. The text predicate is applied afterwards with
/// [`text_matches`], the same fold the quick pass uses.
fn render_search(query: &StoreQuery) -> (String, Vec<Value>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(start) = query.start_day {
        clauses.push("d.id >= ?".to_string());
        values.push(Value::BigInt(start));
    }

    if let Some(end) = query.end_day {
        clauses.push("d.id <= ?".to_string());
        values.push(Value::BigInt(end));
    }

    if let Some(location_ids) = &query.location_ids {
        clauses.push(format!(
            "d.location_id IN ({})",
            placeholders(location_ids.len())
        ));
        values.extend(location_ids.iter().map(|id| Value::BigInt(*id)));
    }

    if let Some(tag_ids) = &query.tag_ids {
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM day_tags dt WHERE dt.day_id = d.id AND dt.tag_id IN ({}))",
            placeholders(tag_ids.len())
        ));
        values.extend(tag_ids.iter().map(|id| Value::BigInt(*id)));
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };

    let sql = format!(
        "SELECT {} FROM days d LEFT JOIN locations l ON l.id = d.location_id{} ORDER BY d.id DESC",
        DAY_COLUMNS, where_clause
    );
    (sql, values)
}

/// An empty id set matches nothing, same as the in-memory predicate.
fn placeholders(count: usize) -> String {
    if count == 0 {
        return "NULL".to_string();
    }
    vec!["?"; count].join(", ")
}

fn read_day_row(row: &duckdb::Row<'_>) -> duckdb::Result<Day> {
    let location_id: Option<i64> = row.get(5)?;
    let location = match location_id {
        Some(id) => Some(Location {
            id,
            name: row.get(6)?,
            latitude: row.get(7)?,
            longitude: row.get(8)?,
            last_used: from_millis(row.get(9)?),
        }),
        None => None,
    };

    Ok(Day {
        id: row.get(0)?,
        summary: row.get(1)?,
        favorite: row.get(2)?,
        created: from_millis(row.get(3)?),
        last_modified: from_millis(row.get(4)?),
        location,
        tags: Vec::new(),
    })
}

fn load_content_tags(conn: &Connection, day_id: EpochDay) -> Result<Vec<ContentTag>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.name, t.last_used, dt.content FROM day_tags dt \
         JOIN tags t ON t.id = dt.tag_id WHERE dt.day_id = ? ORDER BY dt.position",
    )?;
    let rows = stmt.query_map(params![day_id], |row| {
        Ok(ContentTag {
            tag: Tag {
                id: row.get(0)?,
                name: row.get(1)?,
                last_used: from_millis(row.get(2)?),
            },
            content: row.get(3)?,
        })
    })?;

    let mut tags = Vec::new();
    for tag in rows {
        tags.push(tag?);
    }
    Ok(tags)
}

/// `kind` is `location` or `tag`; the table is its plural.
fn ensure_exists(conn: &Connection, kind: &str, id: i64) -> Result<()> {
    let sql = format!("SELECT COUNT(*) FROM {}s WHERE id = ?", kind);
    let count: i64 = conn.query_row(&sql, params![id], |row| row.get(0))?;
    if count == 0 {
        return Err(unknown_reference(kind, id));
    }
    Ok(())
}

fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

impl DuckDbStorage {
    fn setup_migration_system(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        )?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        let applied = self.get_applied_migrations()?;

        for (version, name, sql_content) in MIGRATIONS {
            if !applied.contains(version) {
                self.apply_migration(*version, name, sql_content)?;
                info!("Applied migration {}", name);
            }
        }

        Ok(())
    }

    fn get_applied_migrations(&self) -> Result<HashSet<i32>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT version FROM migrations ORDER BY version")?;

        let rows = stmt.query_map([], |row| {
            let version: i32 = row.get(0)?;
            Ok(version)
        })?;

        let mut applied = HashSet::new();
        for version in rows {
            applied.insert(version?);
        }

        Ok(applied)
    }

    fn apply_migration(&self, version: i32, name: &str, sql_content: &str) -> Result<()> {
        let conn = self.lock()?;

        // Execute the migration SQL
        conn.execute_batch(sql_content)?;

        // Record the migration as applied
        conn.execute(
            "INSERT INTO migrations (version, name) VALUES (?, ?)",
            params![version, name],
        )?;

        Ok(())
    }
}
