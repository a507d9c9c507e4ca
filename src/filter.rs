use std::collections::{HashMap, HashSet};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::catalog::Channel;

/// Category selection that keeps every channel
pub const ALL_CATEGORIES: &str = "All";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Categories,
    Favorites,
    History,
}

/// One display query against a flat channel list. Built per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterQuery {
    #[serde(default)]
    pub view: View,
    #[serde(default = "all_categories")]
    pub selected_category: String,
    #[serde(default)]
    pub search_term: String,
    #[serde(default)]
    pub favorites: HashSet<String>,
    /// Most recent first
    #[serde(default)]
    pub history: Vec<String>,
}

fn all_categories() -> String {
    ALL_CATEGORIES.to_string()
}

impl Default for FilterQuery {
    fn default() -> Self {
        Self {
            view: View::Categories,
            selected_category: all_categories(),
            search_term: String::new(),
            favorites: HashSet::new(),
            history: Vec::new(),
        }
    }
}

impl FilterQuery {
    pub fn with_view(mut self, view: View) -> Self {
        self.view = view;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.selected_category = category.into();
        self
    }

    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        self.search_term = term.into();
        self
    }
}

/// Ordered subset of `all_channels` to display for `query`.
///
/// The view decides the order: favorites keep catalog order, history keeps
/// recency order. Search only removes entries, it never reorders.
pub fn filter_channels(all_channels: &[Channel], query: &FilterQuery) -> Vec<Channel> {
    let viewed: Vec<&Channel> = match query.view {
        View::Favorites => all_channels
            .par_iter()
            .filter(|c| query.favorites.contains(&c.id))
            .collect(),
        View::History => {
            let mut by_id: HashMap<&str, &Channel> = HashMap::with_capacity(all_channels.len());
            for channel in all_channels {
                by_id.entry(channel.id.as_str()).or_insert(channel);
            }
            query
                .history
                .iter()
                .filter_map(|id| by_id.get(id.as_str()).copied())
                .collect()
        }
        View::Categories if query.selected_category == ALL_CATEGORIES => all_channels.par_iter().collect(),
        View::Categories => all_channels
            .par_iter()
            .filter(|c| c.group == query.selected_category)
            .collect(),
    };

    if query.search_term.is_empty() {
        return viewed.into_iter().cloned().collect();
    }

    let needle = query.search_term.to_lowercase();
    viewed
        .into_par_iter()
        .filter(|c| c.name.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}
