use std::collections::HashMap;

use iptv_catalog_lib::catalog::DEFAULT_GROUP;
use iptv_catalog_lib::parser::parse_m3u;
use iptv_catalog_lib::preprocessing::group_into_categories;
use iptv_catalog_lib::proxy_url::ProxyRewriter;

fn main() -> Result<(), anyhow::Error> {
    let path = std::env::args()
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("usage: analyze_playlist <playlist.m3u>"))?;
    let content = std::fs::read_to_string(&path)?;

    println!("=== Playlist Analysis: {} ===\n", path);

    let channels = parse_m3u(&content, &ProxyRewriter::new(false))?;
    let extinf_lines = content.lines().filter(|l| l.trim().starts_with("#EXTINF:")).count();
    println!("  {} #EXTINF directives, {} channels kept", extinf_lines, channels.len());

    let mut id_counts: HashMap<&str, usize> = HashMap::new();
    for ch in &channels {
        *id_counts.entry(ch.id.as_str()).or_default() += 1;
    }
    let duplicate_ids = id_counts.values().filter(|&&n| n > 1).count();
    if duplicate_ids > 0 {
        println!("  ⚠ {} channel ids are shared by more than one entry", duplicate_ids);
    }

    let with_logo = channels.iter().filter(|c| c.logo.is_some()).count();
    let with_epg = channels.iter().filter(|c| c.epg_id.as_deref().is_some_and(|e| !e.is_empty())).count();
    println!("  {} with logo, {} with EPG id\n", with_logo, with_epg);

    let categories = group_into_categories(channels);
    println!("  📂 {} categories", categories.len());
    for cat in &categories {
        let marker = if cat.name == DEFAULT_GROUP { " (default)" } else { "" };
        println!("    {:>6}  {}{}", cat.channels.len(), cat.name, marker);
    }

    Ok(())
}
