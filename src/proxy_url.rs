//! Same-origin proxy rewriting for plain-HTTP resources.
//!
//! A page served over HTTPS cannot load `http://` sub-resources (mixed
//! content). Such URLs are turned into `{route}?url=<percent-encoded url>`,
//! a same-origin path served by [`crate::proxy`].
//!
//! Two policies exist:
//! - [`RewritePolicy::Conditional`] only rewrites `http://` URLs and only in a
//!   secure context. Playable media URLs and logos always use it, so
//!   deployments without TLS are unaffected.
//! - [`RewritePolicy::Forced`] rewrites every absolute `http(s)://` URL
//!   regardless of context. It is used for metadata fetches (playlist text,
//!   Xtream API calls) that the engine performs itself, when a page origin is
//!   known to resolve the proxy path against. Without an origin those
//!   fetches go direct.
//!
//! Both policies are idempotent: their output is a relative path, which is
//! never rewritten again.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{CatalogError, CatalogResult};

pub const DEFAULT_PROXY_ROUTE: &str = "/api/proxy";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewritePolicy {
    Conditional,
    Forced,
}

/// Conditional rewrite against the default proxy route.
pub fn rewrite(url: Option<&str>, is_secure_context: bool) -> Option<String> {
    ProxyRewriter::new(is_secure_context).rewrite(url)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRewriter {
    route: String,
    secure: bool,
    origin: Option<Url>,
}

impl ProxyRewriter {
    pub fn new(is_secure_context: bool) -> Self {
        Self {
            route: DEFAULT_PROXY_ROUTE.to_string(),
            secure: is_secure_context,
            origin: None,
        }
    }

    /// Context of a page loaded from `origin`; secure iff the scheme is https.
    pub fn for_origin(origin: Url) -> Self {
        Self {
            route: DEFAULT_PROXY_ROUTE.to_string(),
            secure: origin.scheme() == "https",
            origin: Some(origin),
        }
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = route.into();
        self
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn origin(&self) -> Option<&Url> {
        self.origin.as_ref()
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    /// Conditional policy
    pub fn rewrite(&self, url: Option<&str>) -> Option<String> {
        self.apply(RewritePolicy::Conditional, url)
    }

    /// Forced policy
    pub fn force_rewrite(&self, url: Option<&str>) -> Option<String> {
        self.apply(RewritePolicy::Forced, url)
    }

    pub fn apply(&self, policy: RewritePolicy, url: Option<&str>) -> Option<String> {
        let url = url.filter(|u| !u.is_empty())?;
        let needs_proxy = match policy {
            RewritePolicy::Conditional => self.secure && url.starts_with("http://"),
            RewritePolicy::Forced => url.starts_with("http://") || url.starts_with("https://"),
        };
        if needs_proxy {
            Some(self.proxied(url))
        } else {
            Some(url.to_string())
        }
    }

    fn proxied(&self, url: &str) -> String {
        format!("{}?url={}", self.route, urlencoding::encode(url))
    }

    /// Absolute URL the engine should request to fetch `url` under `policy`.
    ///
    /// Without a known page origin there is nothing to proxy through, so the
    /// URL is fetched directly whatever the policy or context.
    pub fn resolve_for_fetch(&self, policy: RewritePolicy, url: &str) -> CatalogResult<Url> {
        if url.is_empty() {
            return Err(CatalogError::invalid_source("empty URL"));
        }
        let parse_direct = |u: &str| {
            Url::parse(u).map_err(|e| CatalogError::invalid_source(format!("{}: {}", redact_credentials(url), e)))
        };

        let Some(origin) = self.origin.as_ref() else {
            return parse_direct(url);
        };
        let target = self
            .apply(policy, Some(url))
            .ok_or_else(|| CatalogError::invalid_source("empty URL"))?;
        if target.starts_with('/') {
            return origin
                .join(&target)
                .map_err(|e| CatalogError::invalid_source(format!("{}: {}", target, e)));
        }
        parse_direct(&target)
    }
}

static QUERY_SECRET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)([?&](?:username|password|user|pass|pwd)=)[^&]*").unwrap());
static LIVE_PATH_SECRET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/live/[^/]+/[^/]*/").unwrap());

/// Masks Xtream credentials in query strings and `/live/{user}/{pass}/` paths
/// so URLs can be logged.
pub fn redact_credentials(url: &str) -> String {
    let masked = QUERY_SECRET.replace_all(url, "${1}****");
    LIVE_PATH_SECRET
        .replace_all(&masked, "/live/****/****/")
        .into_owned()
}
