use crate::entities::{Day, Filters, Location, SearchHistory, SearchRequest, Tag};
use crate::infrastructure::EntityStore;
use crate::search::history::HistoryTracker;
use crate::search::matcher::MatchEvaluator;
use crate::search::query::QueryBuilder;
use crate::search::state::{FullResults, LoadState, QueryInput, SearchUiState, compose};
use chrono::Datelike;
use log::{info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Coordinates one search screen: owns the query and filters, the current-year
/// cache and the latest full results, and publishes a composed
/// [`SearchUiState`] whenever any of them changes.
///
/// Each sub-source lives in its own watch channel and the published snapshot
/// is recomputed from the latest value of every channel, so updates may land
/// in any order.
pub struct SearchSession {
    inner: Arc<SessionInner>,
    history_watcher: JoinHandle<()>,
}

struct SessionInner {
    store: Arc<dyn EntityStore>,
    history: HistoryTracker,
    builder: QueryBuilder,
    evaluator: MatchEvaluator,
    /// Current-year days, newest first. Read-only once loaded.
    year_cache: Vec<Day>,
    input: watch::Sender<QueryInput>,
    history_entries: watch::Receiver<SearchHistory>,
    full: watch::Sender<FullResults>,
    locations: watch::Sender<LoadState<Vec<Location>>>,
    tags: watch::Sender<LoadState<Vec<Tag>>>,
    /// Last issued submission generation.
    generation: AtomicU64,
    state: watch::Sender<SearchUiState>,
}

impl SearchSession {
    /// Loads the current-year cache and both option lists, then starts
    /// following history changes.
    ///
    /// A failed cache load leaves quick results empty for the whole session.
    pub async fn start(
        store: Arc<dyn EntityStore>,
        history: HistoryTracker,
        builder: QueryBuilder,
    ) -> Self {
        let year = builder.today().year();
        let (year_days, locations, tags) = tokio::join!(
            store.list_days_by_year(year),
            store.list_all_locations(),
            store.list_all_tags(),
        );

        let year_cache = year_days.unwrap_or_else(|e| {
            warn!("Failed to load {} days for quick search: {}", year, e);
            Vec::new()
        });
        info!(
            "Search session started with {} cached days from {}",
            year_cache.len(),
            year
        );

        let evaluator = MatchEvaluator::new(builder);
        let input = QueryInput {
            quick_results: evaluator.filter(&year_cache, &SearchRequest::default()),
            ..QueryInput::default()
        };
        let history_entries = history.subscribe();

        let inner = Arc::new(SessionInner {
            store,
            history,
            builder,
            evaluator,
            year_cache,
            input: watch::Sender::new(input),
            history_entries,
            full: watch::Sender::new(FullResults::default()),
            locations: watch::Sender::new(LoadState::from_result(locations)),
            tags: watch::Sender::new(LoadState::from_result(tags)),
            generation: AtomicU64::new(0),
            state: watch::Sender::new(SearchUiState::default()),
        });
        inner.recompose();

        let history_watcher = tokio::spawn(follow_history(
            Arc::downgrade(&inner),
            inner.history.subscribe(),
        ));

        Self {
            inner,
            history_watcher,
        }
    }

    /// Latest composed snapshot.
    pub fn state(&self) -> SearchUiState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchUiState> {
        self.inner.state.subscribe()
    }

    pub fn request(&self) -> SearchRequest {
        self.inner.request()
    }

    /// Updates the query text and quick results. Never queries the store.
    pub fn set_search_text(&self, text: impl Into<String>) {
        let text = text.into();
        self.inner.update_input(|input| input.text = text);
    }

    /// Updates the filters. With a non-empty query text this re-submits the
    /// search so full results follow the new filters.
    pub async fn set_filters(&self, filters: Filters) {
        self.inner.update_input(|input| input.filters = filters);

        let has_text = !self.inner.input.borrow().text.is_empty();
        if has_text {
            self.inner.submit().await;
        }
    }

    /// Records the query text in history and refreshes full results from the store.
    pub async fn search(&self) {
        self.inner.submit().await;
    }

    /// Re-queries the location and tag option lists.
    pub async fn reload_options(&self) {
        self.inner.locations.send_replace(LoadState::Loading);
        self.inner.tags.send_replace(LoadState::Loading);
        self.inner.recompose();

        let (locations, tags) = tokio::join!(
            self.inner.store.list_all_locations(),
            self.inner.store.list_all_tags(),
        );

        self.inner.locations.send_replace(LoadState::from_result(locations));
        self.inner.tags.send_replace(LoadState::from_result(tags));
        self.inner.recompose();
    }
}

impl Drop for SearchSession {
    fn drop(&mut self) {
        self.history_watcher.abort();
    }
}

impl SessionInner {
    fn request(&self) -> SearchRequest {
        let input = self.input.borrow();
        SearchRequest {
            text: input.text.clone(),
            filters: input.filters.clone(),
        }
    }

    fn update_input(&self, change: impl FnOnce(&mut QueryInput)) {
        self.input.send_modify(|input| {
            change(input);
            let request = SearchRequest {
                text: input.text.clone(),
                filters: input.filters.clone(),
            };
            input.quick_results = self.evaluator.filter(&self.year_cache, &request);
        });
        self.recompose();
    }

    async fn submit(&self) {
        let request = self.request();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if let Err(e) = self.history.record(&request.text).await {
            warn!("Failed to record search '{}' in history: {}", request.text, e);
        }

        self.full.send_if_modified(|full| {
            if generation > full.generation {
                full.generation = generation;
                full.state = LoadState::Loading;
                true
            } else {
                false
            }
        });
        self.recompose();

        info!("Submitting search #{} for '{}'", generation, request.text);
        let result = self.store.search_days(&self.builder.build(&request)).await;
        if let Err(e) = &result {
            warn!("Search #{} failed: {}", generation, e);
        }

        let applied = self.full.send_if_modified(|full| {
            if full.generation == generation {
                full.state = LoadState::from_result(result);
                true
            } else {
                false
            }
        });

        if applied {
            self.recompose();
        } else {
            warn!(
                "Discarded results of search #{} superseded by a newer submission",
                generation
            );
        }
    }

    fn recompose(&self) {
        self.state.send_if_modified(|state| {
            let composed = compose(
                &self.input.borrow(),
                &self.history_entries.borrow(),
                &self.full.borrow(),
                &self.locations.borrow(),
                &self.tags.borrow(),
            );
            if composed == *state {
                false
            } else {
                *state = composed;
                true
            }
        });
    }
}

async fn follow_history(session: Weak<SessionInner>, mut history: watch::Receiver<SearchHistory>) {
    while history.changed().await.is_ok() {
        match session.upgrade() {
            Some(inner) => inner.recompose(),
            None => break,
        }
    }
}
