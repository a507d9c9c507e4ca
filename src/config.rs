use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::debounce::DEFAULT_FILTER_DEBOUNCE;
use crate::ingest::FetchContext;
use crate::proxy::{ProxyState, DEFAULT_PROXY_USER_AGENT};
use crate::proxy_url::{ProxyRewriter, RewritePolicy, DEFAULT_PROXY_ROUTE};
use crate::session::DEFAULT_HISTORY_LIMIT;

pub const DEFAULT_USER_AGENT: &str = "IPTV Smarters Pro";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Origin of the page the catalog is displayed in. An https origin makes
    /// the context secure.
    pub page_origin: Option<String>,
    pub proxy_route: String,
    /// Rewrite policy for playlist and Xtream API requests
    pub metadata_policy: RewritePolicy,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    pub proxy_user_agent: String,
    pub filter_debounce_ms: u64,
    pub history_limit: usize,
    pub proxy_bind: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            page_origin: None,
            proxy_route: DEFAULT_PROXY_ROUTE.to_string(),
            metadata_policy: RewritePolicy::Forced,
            request_timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy_user_agent: DEFAULT_PROXY_USER_AGENT.to_string(),
            filter_debounce_ms: DEFAULT_FILTER_DEBOUNCE.as_millis() as u64,
            history_limit: DEFAULT_HISTORY_LIMIT,
            proxy_bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl AppConfig {
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "iptv-catalog", "iptv-catalog")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Missing file means defaults
    pub fn load() -> Result<Self, anyhow::Error> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(AppConfig::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: AppConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<(), anyhow::Error> {
        if let Some(path) = Self::config_path() {
            self.save_to(&path)?;
        }
        Ok(())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), anyhow::Error> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn filter_debounce(&self) -> Duration {
        Duration::from_millis(self.filter_debounce_ms)
    }

    pub fn rewriter(&self) -> Result<ProxyRewriter, anyhow::Error> {
        let rewriter = match &self.page_origin {
            Some(origin) => ProxyRewriter::for_origin(Url::parse(origin)?),
            None => ProxyRewriter::new(false),
        };
        Ok(rewriter.with_route(self.proxy_route.clone()))
    }

    pub fn http_client(&self) -> Result<reqwest::Client, anyhow::Error> {
        let client = reqwest::Client::builder()
            .user_agent(self.user_agent.as_str())
            .timeout(self.request_timeout())
            .build()?;
        Ok(client)
    }

    pub fn fetch_context(&self) -> Result<FetchContext, anyhow::Error> {
        Ok(FetchContext::new(
            self.http_client()?,
            self.rewriter()?,
            self.metadata_policy,
        ))
    }

    pub fn proxy_state(&self) -> Result<ProxyState, anyhow::Error> {
        Ok(ProxyState::new(
            self.proxy_user_agent.as_str(),
            self.request_timeout(),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.proxy_route, "/api/proxy");
        assert_eq!(config.metadata_policy, RewritePolicy::Forced);
        assert_eq!(config.filter_debounce(), Duration::from_millis(300));
        assert_eq!(config.history_limit, 50);
        assert_eq!(config.user_agent, "IPTV Smarters Pro");
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{"page_origin": "https://tv.example.com", "history_limit": 10}"#).unwrap();
        assert_eq!(config.history_limit, 10);
        assert_eq!(config.request_timeout_secs, 30);

        let rewriter = config.rewriter().unwrap();
        assert!(rewriter.is_secure());
        assert_eq!(rewriter.origin().map(|o| o.as_str()), Some("https://tv.example.com/"));
    }

    #[test]
    fn test_no_origin_is_insecure() {
        let rewriter = AppConfig::default().rewriter().unwrap();
        assert!(!rewriter.is_secure());
        assert!(rewriter.origin().is_none());
    }

    #[test]
    fn test_bad_origin_is_an_error() {
        let config = AppConfig {
            page_origin: Some("not an origin".into()),
            ..Default::default()
        };
        assert!(config.rewriter().is_err());
    }

    #[test]
    fn test_save_and_load_roundtrip_through_file() {
        let path = std::env::temp_dir()
            .join(format!("iptv-catalog-config-{}", std::process::id()))
            .join("config.json");
        let config = AppConfig {
            proxy_route: "/proxy".into(),
            metadata_policy: RewritePolicy::Conditional,
            ..Default::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(AppConfig::load_from(&path).unwrap(), config);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
