use crate::entities::{Day, EpochDay, LocationId, SearchRequest, TagId};
use crate::search::query::{QueryBuilder, StoreQuery};
use std::collections::BTreeSet;

/// In-process predicate for the quick pass over already-loaded days.
///
/// Shares date resolution and text normalization with [`QueryBuilder`], so a
/// request matches a day here exactly when the store would return it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchEvaluator {
    builder: QueryBuilder,
}

impl MatchEvaluator {
    pub fn new(builder: QueryBuilder) -> Self {
        Self { builder }
    }

    pub fn matches(&self, day: &Day, request: &SearchRequest) -> bool {
        matches_query(day, &self.builder.build(request))
    }

    /// Matching days in their original order.
    pub fn filter<'a, I>(&self, days: I, request: &SearchRequest) -> Vec<Day>
    where
        I: IntoIterator<Item = &'a Day>,
    {
        let query = self.builder.build(request);
        days.into_iter()
            .filter(|day| matches_query(day, &query))
            .cloned()
            .collect()
    }
}

pub(crate) fn matches_query(day: &Day, query: &StoreQuery) -> bool {
    text_matches(day, query.text.as_deref())
        && date_matches(day.id, query.start_day, query.end_day)
        && location_matches(day, query.location_ids.as_ref())
        && tag_matches(day, query.tag_ids.as_ref())
}

/// Lowercases one char at a time, with no context-dependent rules, so a
/// needle and the text it came from always fold the same way.
pub(crate) fn fold_case(text: &str) -> String {
    text.chars().flat_map(char::to_lowercase).collect()
}

/// `needle` is already folded with [`fold_case`].
pub(crate) fn text_matches(day: &Day, needle: Option<&str>) -> bool {
    let Some(needle) = needle else {
        return true;
    };

    fold_case(&day.summary).contains(needle)
        || day.tags.iter().any(|content_tag| {
            content_tag
                .content
                .as_deref()
                .is_some_and(|content| fold_case(content).contains(needle))
        })
}

fn date_matches(day: EpochDay, start: Option<EpochDay>, end: Option<EpochDay>) -> bool {
    start.is_none_or(|start| day >= start) && end.is_none_or(|end| day <= end)
}

fn location_matches(day: &Day, location_ids: Option<&BTreeSet<LocationId>>) -> bool {
    match location_ids {
        None => true,
        Some(ids) => day
            .location
            .as_ref()
            .is_some_and(|location| ids.contains(&location.id)),
    }
}

fn tag_matches(day: &Day, tag_ids: Option<&BTreeSet<TagId>>) -> bool {
    match tag_ids {
        None => true,
        Some(ids) => day
            .tags
            .iter()
            .any(|content_tag| ids.contains(&content_tag.tag.id)),
    }
}
