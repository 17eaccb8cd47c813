use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ============================================================================
// Identifiers
// ============================================================================

/// Days since 1970-01-01. A day entry is keyed by its epoch day.
pub type EpochDay = i64;
pub type LocationId = i64;
pub type TagId = i64;

/// `num_days_from_ce` of 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i64 = 719_163;

pub fn epoch_day(date: NaiveDate) -> EpochDay {
    i64::from(chrono::Datelike::num_days_from_ce(&date)) - UNIX_EPOCH_DAYS_FROM_CE
}

pub fn date_from_epoch_day(day: EpochDay) -> Option<NaiveDate> {
    let days_from_ce = i32::try_from(day.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?).ok()?;
    NaiveDate::from_num_days_from_ce_opt(days_from_ce)
}

// ============================================================================
// Locations and Tags
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub last_used: DateTime<Utc>,
}

impl Location {
    pub fn new(id: LocationId, name: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            id,
            name: name.into(),
            latitude,
            longitude,
            last_used: Utc::now(),
        }
    }

    pub fn same_coordinates(&self, other: &Location) -> bool {
        self.latitude == other.latitude && self.longitude == other.longitude
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub last_used: DateTime<Utc>,
}

impl Tag {
    pub fn new(id: TagId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            last_used: Utc::now(),
        }
    }
}

/// A tag attached to one day, optionally carrying text written for that day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentTag {
    pub tag: Tag,
    pub content: Option<String>,
}

impl ContentTag {
    pub fn new(tag: Tag) -> Self {
        Self { tag, content: None }
    }

    pub fn with_content(tag: Tag, content: impl Into<String>) -> Self {
        Self {
            tag,
            content: Some(content.into()),
        }
    }
}

// ============================================================================
// Day
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Day {
    pub id: EpochDay,
    pub summary: String,
    pub favorite: bool,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub location: Option<Location>,
    pub tags: Vec<ContentTag>,
}

impl Day {
    pub fn new(id: EpochDay, summary: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            summary: summary.into(),
            favorite: false,
            created: now,
            last_modified: now,
            location: None,
            tags: Vec::new(),
        }
    }

    pub fn on(date: NaiveDate, summary: impl Into<String>) -> Self {
        Self::new(epoch_day(date), summary)
    }

    pub fn date(&self) -> Option<NaiveDate> {
        date_from_epoch_day(self.id)
    }

    pub fn favorite(mut self) -> Self {
        self.favorite = true;
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Attaches a tag, replacing any existing association with the same tag.
    pub fn with_tag(mut self, content_tag: ContentTag) -> Self {
        match self
            .tags
            .iter_mut()
            .find(|existing| existing.tag.id == content_tag.tag.id)
        {
            Some(existing) => *existing = content_tag,
            None => self.tags.push(content_tag),
        }
        self
    }
}

// ============================================================================
// Search Request and Filters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Period {
    Week,
    Month,
    SixMonths,
    Year,
}

impl Period {
    /// Latest date still considered "older than" this period, relative to `today`.
    pub fn cutoff(&self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            Period::Week => today.checked_sub_signed(chrono::Duration::days(7)),
            Period::Month => today.checked_sub_months(Months::new(1)),
            Period::SixMonths => today.checked_sub_months(Months::new(6)),
            Period::Year => today.checked_sub_months(Months::new(12)),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Period::Week => "week",
            Period::Month => "month",
            Period::SixMonths => "six-months",
            Period::Year => "year",
        };
        write!(f, "{}", label)
    }
}

impl std::str::FromStr for Period {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            "six-months" | "6-months" | "half-year" => Ok(Period::SixMonths),
            "year" => Ok(Period::Year),
            other => Err(format!("unknown period '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum DateFilter {
    #[default]
    Any,
    OlderThan(Period),
    Custom {
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    },
}

impl DateFilter {
    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        DateFilter::Custom {
            start: Some(start),
            end: Some(end),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filters {
    pub date: DateFilter,
    pub locations: BTreeSet<LocationId>,
    pub tags: BTreeSet<TagId>,
}

impl Filters {
    pub fn with_date(mut self, date: DateFilter) -> Self {
        self.date = date;
        self
    }

    pub fn with_location(mut self, location_id: LocationId) -> Self {
        self.locations.insert(location_id);
        self
    }

    pub fn with_tag(mut self, tag_id: TagId) -> Self {
        self.tags.insert(tag_id);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.date == DateFilter::Any && self.locations.is_empty() && self.tags.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub text: String,
    pub filters: Filters,
}

impl SearchRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            filters: Filters::default(),
        }
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }
}

// ============================================================================
// Search History
// ============================================================================

/// Previously submitted queries, most recent last.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHistory(Vec<String>);

impl SearchHistory {
    pub fn from_entries(entries: Vec<String>) -> Self {
        Self(entries)
    }

    /// Returns a copy with `query` moved (or appended) to the end, keeping at
    /// most `limit` entries. Empty queries leave the history unchanged.
    pub fn recorded(&self, query: &str, limit: usize) -> Self {
        if query.is_empty() {
            return self.clone();
        }

        let mut entries: Vec<String> = self
            .0
            .iter()
            .filter(|existing| existing.as_str() != query)
            .cloned()
            .collect();
        entries.push(query.to_string());

        if entries.len() > limit {
            entries.drain(..entries.len() - limit);
        }

        Self(entries)
    }

    pub fn entries(&self) -> &[String] {
        &self.0
    }

    pub fn most_recent_first(&self) -> Vec<String> {
        self.0.iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_day_round_trips_known_dates() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert_eq!(epoch_day(epoch), 0);

        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(epoch_day(date), 19_797);
        assert_eq!(date_from_epoch_day(19_797), Some(date));
        assert_eq!(date_from_epoch_day(-1), NaiveDate::from_ymd_opt(1969, 12, 31));
    }

    #[test]
    fn out_of_range_epoch_days_have_no_date() {
        assert_eq!(date_from_epoch_day(i64::MAX), None);
        assert_eq!(date_from_epoch_day(i64::MIN), None);
        assert_eq!(Day::new(i64::MAX, "far future").date(), None);
    }

    #[test]
    fn with_tag_keeps_one_association_per_tag() {
        let food = Tag::new(1, "Food");
        let day = Day::new(100, "")
            .with_tag(ContentTag::with_content(food.clone(), "Tried ramen"))
            .with_tag(ContentTag::with_content(food, "Tried udon"));

        assert_eq!(day.tags.len(), 1);
        assert_eq!(day.tags[0].content.as_deref(), Some("Tried udon"));
    }

    #[test]
    fn period_cutoffs_use_calendar_months() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        assert_eq!(Period::Week.cutoff(today), NaiveDate::from_ymd_opt(2024, 3, 24));
        assert_eq!(Period::Month.cutoff(today), NaiveDate::from_ymd_opt(2024, 2, 29));
        assert_eq!(Period::SixMonths.cutoff(today), NaiveDate::from_ymd_opt(2023, 9, 30));
        assert_eq!(Period::Year.cutoff(today), NaiveDate::from_ymd_opt(2023, 3, 31));
    }

    #[test]
    fn history_moves_duplicates_to_the_end() {
        let history = SearchHistory::from_entries(vec!["a".into(), "b".into(), "c".into()]);
        let history = history.recorded("a", 10);
        assert_eq!(history.entries(), ["b", "c", "a"]);
        assert_eq!(history.most_recent_first(), vec!["a", "c", "b"]);
    }

    #[test]
    fn history_truncates_from_the_front() {
        let mut history = SearchHistory::default();
        for query in ["one", "two", "three", "four"] {
            history = history.recorded(query, 3);
        }
        assert_eq!(history.entries(), ["two", "three", "four"]);
    }

    #[test]
    fn history_ignores_empty_and_repeated_queries() {
        let history = SearchHistory::default().recorded("beach", 5);
        assert_eq!(history.recorded("", 5), history);

        let repeated = history.recorded("beach", 5);
        assert_eq!(repeated.len(), history.len());
        assert_eq!(repeated.entries().last().map(String::as_str), Some("beach"));
    }
}
