use std::collections::BTreeMap;

use crate::catalog::{Category, Channel, DEFAULT_GROUP};

/// Groups a flat channel list into categories.
///
/// Categories come out sorted by name (ordinal byte comparison) and each
/// keeps its channels in input order. Every input channel lands in exactly
/// one category.
pub fn group_into_categories(channels: Vec<Channel>) -> Vec<Category> {
    let mut groups: BTreeMap<String, Vec<Channel>> = BTreeMap::new();

    for channel in channels {
        let key = if channel.group.is_empty() {
            DEFAULT_GROUP.to_string()
        } else {
            channel.group.clone()
        };
        groups.entry(key).or_default().push(channel);
    }

    groups
        .into_iter()
        .map(|(name, channels)| Category { name, channels })
        .collect()
}

/// Flat channel list backing a catalog, in category order. Each channel's
/// group is re-tagged with its category name.
pub fn flatten_categories(categories: &[Category]) -> Vec<Channel> {
    categories
        .iter()
        .flat_map(|cat| {
            cat.channels.iter().map(move |ch| Channel {
                group: cat.name.clone(),
                ..ch.clone()
            })
        })
        .collect()
}
