use crate::entities::{Day, Filters, Location, SearchHistory, Tag};
use crate::error::Error;
use serde::Serialize;

/// Loading state of one independently refreshed sub-source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LoadState<T> {
    Loading,
    Error(String),
    Success(T),
}

impl<T> LoadState<T> {
    pub fn from_result(result: Result<T, Error>) -> Self {
        match result {
            Ok(data) => LoadState::Success(data),
            Err(err) => LoadState::Error(err.to_string()),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            LoadState::Success(data) => Some(data),
            LoadState::Loading | LoadState::Error(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            LoadState::Error(message) => Some(message),
            LoadState::Loading | LoadState::Success(_) => None,
        }
    }
}

/// Full-result sub-source, tagged with the submission that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct FullResults {
    /// Generation of the latest submission; zero before the first one.
    pub generation: u64,
    pub state: LoadState<Vec<Day>>,
}

impl Default for FullResults {
    /// Nothing submitted yet reads as an empty success.
    fn default() -> Self {
        Self {
            generation: 0,
            state: LoadState::Success(Vec::new()),
        }
    }
}

/// Text and filters as last set by the caller, with the quick results they produce.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryInput {
    pub text: String,
    pub filters: Filters,
    pub quick_results: Vec<Day>,
}

/// Immutable snapshot handed to the UI layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchUiState {
    pub search_text: String,
    /// Most recent last.
    pub history: Vec<String>,
    pub filters: Filters,
    pub quick_results: Vec<Day>,
    pub full_results: LoadState<Vec<Day>>,
    pub location_options: LoadState<Vec<Location>>,
    pub tag_options: LoadState<Vec<Tag>>,
}

impl Default for SearchUiState {
    fn default() -> Self {
        Self {
            search_text: String::new(),
            history: Vec::new(),
            filters: Filters::default(),
            quick_results: Vec::new(),
            full_results: LoadState::Success(Vec::new()),
            location_options: LoadState::Loading,
            tag_options: LoadState::Loading,
        }
    }
}

/// Merges the latest value of every sub-source into one snapshot.
pub fn compose(
    input: &QueryInput,
    history: &SearchHistory,
    full: &FullResults,
    locations: &LoadState<Vec<Location>>,
    tags: &LoadState<Vec<Tag>>,
) -> SearchUiState {
    SearchUiState {
        search_text: input.text.clone(),
        history: history.entries().to_vec(),
        filters: input.filters.clone(),
        quick_results: input.quick_results.clone(),
        full_results: full.state.clone(),
        location_options: locations.clone(),
        tag_options: tags.clone(),
    }
}
