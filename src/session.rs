use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{Category, Channel, PlaylistSource};
use crate::errors::{CatalogError, CatalogResult};
use crate::filter::{FilterQuery, View, ALL_CATEGORIES};
use crate::preprocessing::flatten_categories;
use crate::worker::{Payload, RequestId, RequestKind, WorkerHandle, WorkerResponse};

pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Favorite channel ids, most recently added first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorites {
    ids: Vec<String>,
}

impl Favorites {
    /// Adds or removes `id`. Returns whether it is a favorite afterwards.
    pub fn toggle(&mut self, id: &str) -> bool {
        if let Some(pos) = self.ids.iter().position(|f| f == id) {
            self.ids.remove(pos);
            false
        } else {
            self.ids.insert(0, id.to_string());
            true
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|f| f == id)
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn to_set(&self) -> HashSet<String> {
        self.ids.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Recently played channel ids, most recent first, without duplicates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchHistory {
    ids: VecDeque<String>,
    limit: usize,
}

impl Default for WatchHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl WatchHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            ids: VecDeque::with_capacity(limit),
            limit,
        }
    }

    pub fn record(&mut self, id: &str) {
        self.ids.retain(|h| h != id);
        self.ids.push_front(id.to_string());
        self.ids.truncate(self.limit);
    }

    pub fn ids(&self) -> Vec<String> {
        self.ids.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&str> {
        self.ids.front().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// What [`CatalogSession::apply`] did with a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// A newer request of the same slot was issued, response ignored
    Stale,
    /// New catalog in place, the display list needs a fresh FILTER
    CatalogReplaced,
    DisplayUpdated,
    Failed(CatalogError),
}

/// Caller-side view of one catalog.
///
/// LOAD and ADD share the catalog slot, FILTER has its own. Only the most
/// recently issued request of a slot may change state, so a slow response
/// can never overwrite a newer one.
#[derive(Debug, Default)]
pub struct CatalogSession {
    latest_catalog: Option<RequestId>,
    latest_filter: Option<RequestId>,
    catalog_pending: bool,
    filter_pending: bool,

    categories: Vec<Category>,
    all_channels: Vec<Channel>,
    display: Vec<Channel>,
    last_error: Option<CatalogError>,

    view: View,
    selected_category: String,
    search_term: String,
    pub favorites: Favorites,
    pub history: WatchHistory,
}

impl CatalogSession {
    pub fn new(history_limit: usize) -> Self {
        Self {
            selected_category: ALL_CATEGORIES.to_string(),
            history: WatchHistory::new(history_limit),
            ..Default::default()
        }
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Flat channel list of the current catalog, groups re-tagged
    pub fn all_channels(&self) -> &[Channel] {
        &self.all_channels
    }

    pub fn display_channels(&self) -> &[Channel] {
        &self.display
    }

    pub fn last_error(&self) -> Option<&CatalogError> {
        self.last_error.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.catalog_pending
    }

    pub fn is_filtering(&self) -> bool {
        self.filter_pending
    }

    pub fn view(&self) -> View {
        self.view
    }

    /// Switching views resets the category selection
    pub fn set_view(&mut self, view: View) {
        self.view = view;
        self.selected_category = ALL_CATEGORIES.to_string();
    }

    pub fn select_category(&mut self, category: impl Into<String>) {
        self.selected_category = category.into();
    }

    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.search_term = term.into();
    }

    pub fn query(&self) -> FilterQuery {
        FilterQuery {
            view: self.view,
            selected_category: self.selected_category.clone(),
            search_term: self.search_term.clone(),
            favorites: self.favorites.to_set(),
            history: self.history.ids(),
        }
    }

    /// Marks `id` as the request whose answer the session waits for
    pub fn track(&mut self, kind: RequestKind, id: RequestId) {
        match kind {
            RequestKind::Load | RequestKind::Add => {
                self.latest_catalog = Some(id);
                self.catalog_pending = true;
            }
            RequestKind::Filter => {
                self.latest_filter = Some(id);
                self.filter_pending = true;
            }
        }
    }

    pub fn load(&mut self, worker: &WorkerHandle, source: PlaylistSource) -> CatalogResult<RequestId> {
        let id = worker.load(source)?;
        self.track(RequestKind::Load, id);
        Ok(id)
    }

    pub fn add(&mut self, worker: &WorkerHandle, source: PlaylistSource) -> CatalogResult<RequestId> {
        let id = worker.add(source)?;
        self.track(RequestKind::Add, id);
        Ok(id)
    }

    /// Sends a FILTER for the current catalog and query. Skipped while a
    /// catalog request is outstanding.
    pub fn refresh_display(&mut self, worker: &WorkerHandle) -> CatalogResult<Option<RequestId>> {
        if self.catalog_pending {
            return Ok(None);
        }
        let id = worker.filter(self.all_channels.clone(), self.query())?;
        self.track(RequestKind::Filter, id);
        Ok(Some(id))
    }

    pub fn apply(&mut self, response: WorkerResponse) -> Applied {
        let latest = match response.kind {
            RequestKind::Load | RequestKind::Add => self.latest_catalog,
            RequestKind::Filter => self.latest_filter,
        };
        if latest != Some(response.id) {
            debug!("Ignoring stale {:?} response {}", response.kind, response.id);
            return Applied::Stale;
        }

        let kind = response.kind;
        match kind {
            RequestKind::Load | RequestKind::Add => self.catalog_pending = false,
            RequestKind::Filter => self.filter_pending = false,
        }

        match (kind, response.into_result()) {
            (RequestKind::Load | RequestKind::Add, Ok(Payload::Categories(categories))) => {
                self.all_channels = flatten_categories(&categories);
                self.categories = categories;
                self.last_error = None;
                Applied::CatalogReplaced
            }
            (RequestKind::Filter, Ok(Payload::Channels(channels))) => {
                self.display = channels;
                Applied::DisplayUpdated
            }
            (_, Ok(_)) => self.fail(kind, CatalogError::internal("response payload does not match its request kind")),
            (_, Err(err)) => self.fail(kind, err),
        }
    }

    /// A failed LOAD leaves no active catalog, a failed ADD keeps the
    /// previous one.
    fn fail(&mut self, kind: RequestKind, err: CatalogError) -> Applied {
        if kind == RequestKind::Load {
            self.categories.clear();
            self.all_channels.clear();
            self.display.clear();
        }
        self.last_error = Some(err.clone());
        Applied::Failed(err)
    }
}
