//! Extended-M3U playlist parsing.
//!
//! ```text
//! #EXTM3U
//! #EXTINF:-1 tvg-id="news.one" tvg-name="News One" tvg-logo="http://x/n.png" group-title="News",News One
//! http://a.test/news1
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::catalog::{Category, Channel};
use crate::errors::{CatalogError, CatalogResult};
use crate::preprocessing::group_into_categories;
use crate::proxy_url::ProxyRewriter;

pub const M3U_HEADER: &str = "#EXTM3U";
const EXTINF_PREFIX: &str = "#EXTINF:";

static TVG_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r#"tvg-id="([^"]*)""#).unwrap());
static TVG_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r#"tvg-name="([^"]*)""#).unwrap());
static TVG_LOGO: Lazy<Regex> = Lazy::new(|| Regex::new(r#"tvg-logo="([^"]*)""#).unwrap());
static GROUP_TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"group-title="([^"]*)""#).unwrap());

/// Metadata collected from an `#EXTINF` line, waiting for its URL line
#[derive(Debug, Default, Clone, PartialEq)]
struct PendingEntry {
    name: Option<String>,
    logo: Option<String>,
    group: Option<String>,
    epg_id: Option<String>,
}

fn capture(re: &Regex, haystack: &str) -> Option<String> {
    re.captures(haystack)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Attributes are looked up independently, so their order on the line is
/// irrelevant. Without a non-empty `tvg-name` the text after the last comma
/// is the display name.
fn parse_extinf(line: &str) -> PendingEntry {
    let info = match line.find(' ') {
        Some(pos) => &line[pos + 1..],
        None => line,
    };

    let mut entry = PendingEntry {
        name: capture(&TVG_NAME, info).filter(|n| !n.is_empty()),
        logo: capture(&TVG_LOGO, info),
        group: capture(&GROUP_TITLE, info),
        epg_id: capture(&TVG_ID, info),
    };

    if entry.name.is_none() {
        entry.name = info
            .rfind(',')
            .map(|pos| info[pos + 1..].trim())
            .filter(|n| !n.is_empty())
            .map(str::to_string);
    }

    entry
}

/// Parses an Extended-M3U document into a flat channel list in document
/// order. Logo and stream URLs go through the conditional rewrite policy.
///
/// Directives that are not followed by a URL line, or that carry no name,
/// are dropped silently. An empty result is not an error here.
pub fn parse_m3u(content: &str, rewriter: &ProxyRewriter) -> CatalogResult<Vec<Channel>> {
    if !content.starts_with(M3U_HEADER) {
        return Err(CatalogError::Format);
    }

    let mut channels = Vec::new();
    let mut pending: Option<PendingEntry> = None;
    let mut dropped = 0usize;

    for raw in content.split('\n').skip(1) {
        let line = raw.trim();

        if line.starts_with(EXTINF_PREFIX) {
            if pending.replace(parse_extinf(line)).is_some() {
                dropped += 1;
            }
            continue;
        }

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some(entry) = pending.take() else {
            continue;
        };
        let Some(name) = entry.name else {
            dropped += 1;
            continue;
        };

        let logo = rewriter.rewrite(entry.logo.as_deref());
        let url = rewriter.rewrite(Some(line)).unwrap_or_else(|| line.to_string());
        let mut channel = Channel::new(name, line, entry.group, logo, entry.epg_id);
        // id derives from the source URL, the stored URL is the playable one
        channel.url = url;
        channels.push(channel);
    }

    if pending.is_some() {
        dropped += 1;
    }
    if dropped > 0 {
        debug!("Dropped {} incomplete #EXTINF entries", dropped);
    }
    debug!("Parsed {} channels from M3U text", channels.len());

    Ok(channels)
}

/// [`parse_m3u`] followed by category aggregation
pub fn parse_playlist(content: &str, rewriter: &ProxyRewriter) -> CatalogResult<Vec<Category>> {
    parse_m3u(content, rewriter).map(group_into_categories)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain() -> ProxyRewriter {
        ProxyRewriter::new(false)
    }

    #[test]
    fn test_missing_header_is_format_error() {
        let err = parse_m3u("#EXTINF:-1,News\nhttp://a/1\n", &plain()).unwrap_err();
        assert_eq!(err, CatalogError::Format);
        assert_eq!(parse_m3u("", &plain()).unwrap_err(), CatalogError::Format);
        assert_eq!(parse_m3u(" #EXTM3U\n", &plain()).unwrap_err(), CatalogError::Format);
    }

    #[test]
    fn test_header_only_yields_no_channels() {
        assert!(parse_m3u("#EXTM3U\n", &plain()).unwrap().is_empty());
    }

    #[test]
    fn test_parse_full_attributes() {
        let text = "#EXTM3U\n#EXTINF:-1 tvg-id=\"n1.us\" tvg-name=\"News One\" tvg-logo=\"https://img/n1.png\" group-title=\"News\",Ignored\nhttp://a.test/news1\n";
        let channels = parse_m3u(text, &plain()).unwrap();
        assert_eq!(channels.len(), 1);
        let ch = &channels[0];
        assert_eq!(ch.name, "News One");
        assert_eq!(ch.epg_id.as_deref(), Some("n1.us"));
        assert_eq!(ch.logo.as_deref(), Some("https://img/n1.png"));
        assert_eq!(ch.group, "News");
        assert_eq!(ch.url, "http://a.test/news1");
        assert_eq!(ch.id, "News-News One-http://a.test/news1");
    }

    #[test]
    fn test_attribute_order_does_not_matter() {
        let a = "#EXTM3U\n#EXTINF:-1 tvg-id=\"x\" tvg-name=\"X\" tvg-logo=\"l\" group-title=\"G\",X\nhttp://h/x\n";
        let b = "#EXTM3U\n#EXTINF:-1 group-title=\"G\" tvg-logo=\"l\" tvg-name=\"X\" tvg-id=\"x\",X\nhttp://h/x\n";
        assert_eq!(parse_m3u(a, &plain()).unwrap(), parse_m3u(b, &plain()).unwrap());
    }

    #[test]
    fn test_display_name_falls_back_to_last_comma() {
        let text = "#EXTM3U\n#EXTINF:-1 group-title=\"Sports, Live\",Sports One\nhttp://a/s1\n#EXTINF:-1 tvg-name=\"\",Empty Attr\nhttp://a/e\n";
        let channels = parse_m3u(text, &plain()).unwrap();
        assert_eq!(channels[0].name, "Sports One");
        assert_eq!(channels[0].group, "Sports, Live");
        assert_eq!(channels[1].name, "Empty Attr");
    }

    #[test]
    fn test_legacy_directive_without_attributes() {
        let text = "#EXTM3U\n#EXTINF:-1,Plain Channel\nhttp://a/p\n";
        let channels = parse_m3u(text, &plain()).unwrap();
        assert_eq!(channels[0].name, "Plain Channel");
        assert_eq!(channels[0].group, "General");
        assert_eq!(channels[0].logo, None);
        assert_eq!(channels[0].epg_id, None);
    }

    #[test]
    fn test_directive_without_url_is_dropped() {
        let text = "#EXTM3U\n#EXTINF:-1,Orphan\n#EXTINF:-1,Kept\nhttp://a/kept\n#EXTINF:-1,Trailing\n";
        let channels = parse_m3u(text, &plain()).unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].name, "Kept");
    }

    #[test]
    fn test_url_without_directive_is_ignored() {
        let text = "#EXTM3U\nhttp://a/stray\n#EXTINF:-1,One\nhttp://a/one\nhttp://a/second-url\n";
        let channels = parse_m3u(text, &plain()).unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].url, "http://a/one");
    }

    #[test]
    fn test_nameless_directive_is_dropped() {
        let text = "#EXTM3U\n#EXTINF:-1 group-title=\"G\"\nhttp://a/none\n";
        assert!(parse_m3u(text, &plain()).unwrap().is_empty());
    }

    #[test]
    fn test_comments_and_blank_lines_between_directive_and_url() {
        let text = "#EXTM3U\r\n#EXTINF:-1,Opt\r\n#EXTVLCOPT:http-user-agent=VLC\r\n\r\nhttp://a/opt\r\n";
        let channels = parse_m3u(text, &plain()).unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].url, "http://a/opt");
    }

    #[test]
    fn test_secure_context_rewrites_url_and_logo() {
        let text = "#EXTM3U\n#EXTINF:-1 tvg-logo=\"http://img/l.png\" group-title=\"News\",N\nhttp://a.test/n\n";
        let channels = parse_m3u(text, &ProxyRewriter::new(true)).unwrap();
        let ch = &channels[0];
        assert_eq!(ch.url, "/api/proxy?url=http%3A%2F%2Fa.test%2Fn");
        assert_eq!(ch.logo.as_deref(), Some("/api/proxy?url=http%3A%2F%2Fimg%2Fl.png"));
        assert_eq!(ch.id, "News-N-http://a.test/n");
    }

    #[test]
    fn test_parse_playlist_groups_and_sorts() {
        let text = "#EXTM3U\n#EXTINF:-1 group-title=\"Sports\",S\nhttp://a/s\n#EXTINF:-1 group-title=\"News\",N\nhttp://a/n\n";
        let categories = parse_playlist(text, &plain()).unwrap();
        let names: Vec<_> = categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["News", "Sports"]);
    }
}
