use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::{Category, Channel, Credentials};
use crate::errors::{ApiCall, CatalogError, CatalogResult};
use crate::flex_id::FlexId;
use crate::ingest::FetchContext;
use crate::preprocessing::group_into_categories;
use crate::proxy_url::redact_credentials;

/// Entry of `action=get_live_categories`
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct XtreamCategory {
    #[serde(default)]
    pub category_id: FlexId,
    #[serde(default)]
    pub category_name: String,
    #[serde(default)]
    pub parent_id: serde_json::Value, // frequent null or 0
}

/// Entry of `action=get_live_streams`
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct XtreamStream {
    #[serde(default)]
    pub num: Option<serde_json::Value>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub stream_id: FlexId,
    #[serde(default)]
    pub stream_icon: Option<String>,
    #[serde(default)]
    pub category_id: FlexId,
    #[serde(default)]
    pub container_extension: Option<String>,
    #[serde(default)]
    pub epg_channel_id: Option<String>,
}

const DEFAULT_CONTAINER: &str = "ts";

#[derive(Debug, Clone)]
pub struct XtreamClient {
    base_url: String,
    credentials: Credentials,
    ctx: FetchContext,
}

impl XtreamClient {
    pub fn new(base_url: impl Into<String>, credentials: Credentials, ctx: FetchContext) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            credentials,
            ctx,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn api_url(&self, action: &str) -> String {
        format!(
            "{}/player_api.php?username={}&password={}&action={}",
            self.base_url,
            urlencoding::encode(&self.credentials.username),
            urlencoding::encode(self.credentials.password_or_empty()),
            action
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, call: ApiCall, action: &str) -> CatalogResult<T> {
        let url = self.api_url(action);
        let target = self
            .ctx
            .rewriter
            .resolve_for_fetch(self.ctx.metadata_policy, &url)?;
        debug!("Fetching {} from {}", call, redact_credentials(target.as_str()));

        let resp = self
            .ctx
            .http
            .get(target)
            .send()
            .await
            .map_err(|e| CatalogError::network(call, e))?;

        let status = resp.status();
        if !status.is_success() {
            warn!("{} returned HTTP {}", call, status.as_u16());
            return Err(CatalogError::Api {
                call,
                status: status.as_u16(),
            });
        }

        resp.json::<T>()
            .await
            .map_err(|e| CatalogError::network(call, e))
    }

    pub async fn get_live_categories(&self) -> CatalogResult<Vec<XtreamCategory>> {
        self.get_json(ApiCall::Categories, "get_live_categories").await
    }

    pub async fn get_live_streams(&self) -> CatalogResult<Vec<XtreamStream>> {
        self.get_json(ApiCall::Streams, "get_live_streams").await
    }

    /// Playable URL of a live stream, built from the configured base URL.
    /// Not rewritten.
    pub fn get_stream_url(&self, stream_id: &str, extension: &str) -> String {
        format!(
            "{}/live/{}/{}/{}.{}",
            self.base_url,
            self.credentials.username,
            self.credentials.password_or_empty(),
            stream_id,
            extension
        )
    }

    /// Fetches categories then streams and maps every stream to a channel.
    /// Either call failing abandons the whole listing.
    pub async fn fetch_channels(&self) -> CatalogResult<Vec<Channel>> {
        let categories = self.get_live_categories().await?;
        let streams = self.get_live_streams().await?;
        info!(
            "Xtream server {} returned {} categories and {} streams",
            redact_credentials(&self.base_url),
            categories.len(),
            streams.len()
        );
        Ok(self.map_streams(&categories, streams))
    }

    pub async fn fetch_catalog(&self) -> CatalogResult<Vec<Category>> {
        self.fetch_channels().await.map(group_into_categories)
    }

    fn map_streams(&self, categories: &[XtreamCategory], streams: Vec<XtreamStream>) -> Vec<Channel> {
        let mut group_names: HashMap<String, &str> = HashMap::with_capacity(categories.len());
        for cat in categories {
            if let Some(key) = cat.category_id.join_key() {
                group_names.entry(key).or_insert(cat.category_name.as_str());
            }
        }

        let mut skipped = 0usize;
        let channels: Vec<Channel> = streams
            .into_iter()
            .filter_map(|stream| {
                let Some(id) = stream.stream_id.to_key() else {
                    skipped += 1;
                    return None;
                };
                let group = stream
                    .category_id
                    .join_key()
                    .and_then(|key| group_names.get(&key))
                    .map(|name| name.to_string());
                let extension = stream
                    .container_extension
                    .as_deref()
                    .filter(|ext| !ext.is_empty())
                    .unwrap_or(DEFAULT_CONTAINER);
                let url = self.get_stream_url(&id, extension);

                Some(Channel::with_id(
                    id,
                    stream.name.unwrap_or_default(),
                    self.ctx.rewriter.rewrite(Some(&url)).unwrap_or(url),
                    group,
                    self.ctx.rewriter.rewrite(stream.stream_icon.as_deref()),
                    stream.epg_channel_id,
                ))
            })
            .collect();

        if skipped > 0 {
            warn!("Skipped {} streams without a stream_id", skipped);
        }
        channels
    }
}
