//! Same-origin streaming proxy.
//!
//! Serves `{route}?url=<percent-encoded absolute URL>` for the URLs produced by
//! [`crate::proxy_url`]. The upstream body is streamed through, never
//! buffered.

use std::time::Duration;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::{ACCEPT, CONTENT_ENCODING, RANGE, TRANSFER_ENCODING, USER_AGENT};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::errors::{CatalogError, CatalogResult};
use crate::proxy_url::redact_credentials;

pub const DEFAULT_PROXY_USER_AGENT: &str = "VLC/3.0.20 LibVLC/3.0.20";

#[derive(Debug, Clone)]
pub struct ProxyState {
    http: reqwest::Client,
    user_agent: String,
}

impl ProxyState {
    /// No overall timeout: live streams never end.
    pub fn new(user_agent: impl Into<String>, connect_timeout: Duration) -> CatalogResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| CatalogError::internal(format!("failed to build proxy client: {}", e)))?;
        Ok(Self::with_client(http, user_agent))
    }

    pub fn with_client(http: reqwest::Client, user_agent: impl Into<String>) -> Self {
        Self {
            http,
            user_agent: user_agent.into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ProxyParams {
    #[serde(default)]
    pub url: Option<String>,
}

pub fn router(route: &str, state: ProxyState) -> Router {
    Router::new()
        .route(route, any(proxy_handler))
        .with_state(state)
}

pub async fn serve(listener: TcpListener, route: &str, state: ProxyState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Proxy listening on http://{}{}", addr, route);
    }
    axum::serve(listener, router(route, state)).await
}

/// The `url` parameter must be an absolute http(s) URL
pub fn validate_target(raw: Option<&str>) -> Result<Url, &'static str> {
    let raw = raw.filter(|u| !u.is_empty()).ok_or("The \"url\" parameter is required.")?;
    let url = Url::parse(raw).map_err(|_| "An invalid URL was provided.")?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err("An invalid URL was provided."),
    }
}

pub async fn proxy_handler(
    State(state): State<ProxyState>,
    method: Method,
    headers: HeaderMap,
    Query(params): Query<ProxyParams>,
) -> Response {
    let target = match validate_target(params.url.as_deref()) {
        Ok(url) => url,
        Err(message) => {
            debug!("Rejected proxy request: {}", message);
            return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": message }))).into_response();
        }
    };

    let accept = headers
        .get(ACCEPT)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("*/*"));
    let mut request = state
        .http
        .request(method, target.clone())
        .header(USER_AGENT, state.user_agent.as_str())
        .header(ACCEPT, accept);
    if let Some(range) = headers.get(RANGE) {
        request = request.header(RANGE, range.clone());
    }

    match request.send().await {
        Ok(upstream) => stream_back(upstream),
        Err(e) => {
            let err = CatalogError::ProxyUpstream {
                target: redact_credentials(target.as_str()),
                message: e.to_string(),
            };
            warn!("{}", err);
            bad_gateway()
        }
    }
}

fn stream_back(upstream: reqwest::Response) -> Response {
    let mut builder = Response::builder().status(upstream.status());
    if let Some(out) = builder.headers_mut() {
        for (name, value) in upstream.headers() {
            if name == CONTENT_ENCODING || name == TRANSFER_ENCODING {
                continue;
            }
            out.append(name.clone(), value.clone());
        }
    }

    match builder.body(Body::from_stream(upstream.bytes_stream())) {
        Ok(response) => response,
        Err(e) => {
            error!("Failed to build proxy response: {}", e);
            bad_gateway()
        }
    }
}

fn bad_gateway() -> Response {
    (
        StatusCode::BAD_GATEWAY,
        Json(serde_json::json!({
            "error": "Bad gateway",
            "message": "The proxy server could not fetch the requested resource."
        })),
    )
        .into_response()
}
