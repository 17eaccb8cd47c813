use crate::entities::{DateFilter, Day, EpochDay, LocationId, SearchRequest, TagId, epoch_day};
use crate::search::matcher;
use chrono::{Local, NaiveDate};
use log::debug;
use std::collections::BTreeSet;

/// Store-level filter descriptor. Every `None` means "no constraint".
///
/// The text predicate is OR-ed across the day summary and the content of each
/// attached tag; the remaining predicates are AND-ed together.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreQuery {
    /// Case-folded search needle.
    pub text: Option<String>,
    /// Inclusive lower bound on the day id.
    pub start_day: Option<EpochDay>,
    /// Inclusive upper bound on the day id.
    pub end_day: Option<EpochDay>,
    pub location_ids: Option<BTreeSet<LocationId>>,
    pub tag_ids: Option<BTreeSet<TagId>>,
}

impl StoreQuery {
    /// Every day in the store.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_unconstrained(&self) -> bool {
        self == &Self::default()
    }

    /// Evaluates the descriptor against an already-loaded day.
    pub fn matches(&self, day: &Day) -> bool {
        matcher::matches_query(day, self)
    }
}

/// Translates a [`SearchRequest`] into a [`StoreQuery`].
///
/// Relative date filters are resolved against the builder's `today`, so the
/// same builder must feed both the in-memory and the persisted pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryBuilder {
    today: NaiveDate,
}

impl QueryBuilder {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }

    pub fn for_today() -> Self {
        Self::new(Local::now().date_naive())
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn build(&self, request: &SearchRequest) -> StoreQuery {
        let (start_day, end_day) = date_bounds(&request.filters.date, self.today);

        let query = StoreQuery {
            text: normalize_text(&request.text),
            start_day,
            end_day,
            location_ids: non_empty(&request.filters.locations),
            tag_ids: non_empty(&request.filters.tags),
        };

        debug!("Built store query {:?} from request {:?}", query, request);
        query
    }
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::for_today()
    }
}

/// Empty text means "no text filter".
pub(crate) fn normalize_text(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(matcher::fold_case(text))
    }
}

/// Resolves a date filter into inclusive epoch-day bounds.
///
/// An inverted custom range resolves to no bounds at all.
pub(crate) fn date_bounds(
    filter: &DateFilter,
    today: NaiveDate,
) -> (Option<EpochDay>, Option<EpochDay>) {
    match filter {
        DateFilter::Any => (None, None),
        DateFilter::OlderThan(period) => (None, period.cutoff(today).map(epoch_day)),
        DateFilter::Custom {
            start: Some(start),
            end: Some(end),
        } if start > end => {
            debug!(
                "Ignoring inverted date range {} > {}, treating as unbounded",
                start, end
            );
            (None, None)
        }
        DateFilter::Custom { start, end } => (start.map(epoch_day), end.map(epoch_day)),
    }
}

fn non_empty<T: Ord + Clone>(set: &BTreeSet<T>) -> Option<BTreeSet<T>> {
    if set.is_empty() {
        None
    } else {
        Some(set.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Filters, Period};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn builder() -> QueryBuilder {
        QueryBuilder::new(date(2024, 6, 15))
    }

    #[test]
    fn empty_request_builds_unconstrained_query() {
        let query = builder().build(&SearchRequest::default());
        assert!(query.is_unconstrained());
        assert_eq!(query, StoreQuery::all());
    }

    #[test]
    fn text_is_case_folded() {
        let query = builder().build(&SearchRequest::new("Hiking TRIP"));
        assert_eq!(query.text.as_deref(), Some("hiking trip"));

        let query = builder().build(&SearchRequest::new("ΟΔΟΣ"));
        assert_eq!(query.text.as_deref(), Some("οδοσ"));
    }

    #[test]
    fn custom_range_is_inclusive_epoch_days() {
        let filters = Filters::default().with_date(DateFilter::between(date(2024, 3, 1), date(2024, 3, 31)));
        let query = builder().build(&SearchRequest::new("").with_filters(filters));

        assert_eq!(query.start_day, Some(epoch_day(date(2024, 3, 1))));
        assert_eq!(query.end_day, Some(epoch_day(date(2024, 3, 31))));
    }

    #[test]
    fn open_ended_custom_range_keeps_single_bound() {
        let filters = Filters::default().with_date(DateFilter::Custom {
            start: None,
            end: Some(date(2024, 1, 1)),
        });
        let query = builder().build(&SearchRequest::default().with_filters(filters));

        assert_eq!(query.start_day, None);
        assert_eq!(query.end_day, Some(epoch_day(date(2024, 1, 1))));
    }

    #[test]
    fn inverted_custom_range_behaves_like_any() {
        let inverted = Filters::default().with_date(DateFilter::between(date(2024, 5, 1), date(2024, 4, 1)));
        let any = Filters::default();

        let inverted_query = builder().build(&SearchRequest::new("x").with_filters(inverted));
        let any_query = builder().build(&SearchRequest::new("x").with_filters(any));
        assert_eq!(inverted_query, any_query);
    }

    #[test]
    fn older_than_sets_only_an_upper_bound() {
        let filters = Filters::default().with_date(DateFilter::OlderThan(Period::Month));
        let query = builder().build(&SearchRequest::default().with_filters(filters));

        assert_eq!(query.start_day, None);
        assert_eq!(query.end_day, Some(epoch_day(date(2024, 5, 15))));
    }

    #[test]
    fn empty_id_sets_are_absent_not_match_nothing() {
        let query = builder().build(&SearchRequest::new("beach"));
        assert_eq!(query.location_ids, None);
        assert_eq!(query.tag_ids, None);

        let filters = Filters::default().with_location(5).with_tag(1).with_tag(2);
        let query = builder().build(&SearchRequest::new("beach").with_filters(filters));
        assert_eq!(query.location_ids, Some(BTreeSet::from([5])));
        assert_eq!(query.tag_ids, Some(BTreeSet::from([1, 2])));
    }
}
