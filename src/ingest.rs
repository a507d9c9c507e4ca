use tracing::{debug, info, warn};

use crate::api::XtreamClient;
use crate::catalog::{Category, Channel, PlaylistSource, SourceKind};
use crate::errors::{ApiCall, CatalogError, CatalogResult};
use crate::parser::parse_m3u;
use crate::preprocessing::group_into_categories;
use crate::proxy_url::{redact_credentials, ProxyRewriter, RewritePolicy};

/// Everything an ingestion needs to talk to the network
#[derive(Debug, Clone)]
pub struct FetchContext {
    pub http: reqwest::Client,
    pub rewriter: ProxyRewriter,
    /// Policy for requests the engine makes itself (playlist text, API calls)
    pub metadata_policy: RewritePolicy,
}

impl FetchContext {
    pub fn new(http: reqwest::Client, rewriter: ProxyRewriter, metadata_policy: RewritePolicy) -> Self {
        Self {
            http,
            rewriter,
            metadata_policy,
        }
    }

    /// No page origin: the engine fetches directly. `is_secure_context` only
    /// decides whether channel and logo URLs get rewritten.
    pub fn offline(is_secure_context: bool) -> Self {
        Self::new(
            reqwest::Client::new(),
            ProxyRewriter::new(is_secure_context),
            RewritePolicy::Conditional,
        )
    }
}

/// Downloads the text of an M3U playlist
pub async fn fetch_playlist_text(ctx: &FetchContext, location: &str) -> CatalogResult<String> {
    let target = ctx.rewriter.resolve_for_fetch(ctx.metadata_policy, location)?;
    debug!("Downloading playlist from {}", redact_credentials(target.as_str()));

    let resp = ctx
        .http
        .get(target)
        .send()
        .await
        .map_err(|e| CatalogError::network(ApiCall::Playlist, e))?;

    let status = resp.status();
    if !status.is_success() {
        warn!("Playlist download returned HTTP {}", status.as_u16());
        return Err(CatalogError::Api {
            call: ApiCall::Playlist,
            status: status.as_u16(),
        });
    }

    resp.text()
        .await
        .map_err(|e| CatalogError::network(ApiCall::Playlist, e))
}

/// Flat channel list of a source, before aggregation
pub async fn ingest_channels(ctx: &FetchContext, source: &PlaylistSource) -> CatalogResult<Vec<Channel>> {
    match source.kind {
        SourceKind::File => parse_m3u(&source.source, &ctx.rewriter),
        SourceKind::Url => {
            let text = fetch_playlist_text(ctx, &source.source).await?;
            parse_m3u(&text, &ctx.rewriter)
        }
        SourceKind::Xtream => {
            let credentials = source
                .credentials
                .clone()
                .ok_or_else(|| CatalogError::invalid_source("Xtream source requires a username"))?;
            XtreamClient::new(source.source.clone(), credentials, ctx.clone())
                .fetch_channels()
                .await
        }
    }
}

/// Source → parser or Xtream client → category aggregation
pub async fn ingest(ctx: &FetchContext, source: &PlaylistSource) -> CatalogResult<Vec<Category>> {
    let channels = ingest_channels(ctx, source).await?;
    let categories = group_into_categories(channels);
    info!(
        "Ingested {:?} source into {} categories ({} channels)",
        source.kind,
        categories.len(),
        categories.iter().map(|c| c.channels.len()).sum::<usize>()
    );
    Ok(categories)
}
