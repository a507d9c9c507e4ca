use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which remote call an ingestion failure belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiCall {
    /// Downloading an Extended-M3U document from a URL
    Playlist,
    /// `action=get_live_categories`
    Categories,
    /// `action=get_live_streams`
    Streams,
}

impl std::fmt::Display for ApiCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl ApiCall {
    pub fn display_name(&self) -> &'static str {
        match self {
            ApiCall::Playlist => "Playlist Download",
            ApiCall::Categories => "Live Categories",
            ApiCall::Streams => "Live Streams",
        }
    }

    /// Actionable hint shown next to a failure of this call
    pub fn suggestion(&self) -> &'static str {
        match self {
            ApiCall::Playlist => "Check that the playlist URL is reachable and points to an M3U file.",
            ApiCall::Categories => {
                "The server rejected the category listing. Verify the server URL and credentials."
            }
            ApiCall::Streams => {
                "The server rejected the stream listing. The provider may be overloaded, try again later."
            }
        }
    }
}

/// Every failure the catalog engine can report to a caller.
///
/// Errors are plain data so they can be moved across the worker boundary
/// inside a response envelope.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CatalogError {
    /// Playlist text does not start with `#EXTM3U`
    #[error("Invalid M3U file: missing #EXTM3U header")]
    Format,

    /// A remote call answered with a non-success HTTP status
    #[error("{call} request failed with HTTP status {status}")]
    Api { call: ApiCall, status: u16 },

    /// The request itself failed (DNS, connect, TLS, body decode)
    #[error("{call} request could not be completed: {message}")]
    Network { call: ApiCall, message: String },

    /// Ingestion succeeded but produced no channels
    #[error("The playlist is empty or could not be parsed")]
    EmptyResult,

    /// The proxy endpoint could not reach its target
    #[error("Proxy could not reach {target}: {message}")]
    ProxyUpstream { target: String, message: String },

    /// The caller handed over a source that cannot be ingested
    #[error("Invalid playlist source: {message}")]
    InvalidSource { message: String },

    /// Unexpected failure inside the background worker
    #[error("Internal worker error: {message}")]
    Internal { message: String },
}

impl CatalogError {
    pub fn network(call: ApiCall, err: impl std::fmt::Display) -> Self {
        CatalogError::Network {
            call,
            message: err.to_string(),
        }
    }

    pub fn invalid_source(message: impl Into<String>) -> Self {
        CatalogError::InvalidSource {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CatalogError::Internal {
            message: message.into(),
        }
    }

    /// Remote call this error is attributed to, if any
    pub fn call(&self) -> Option<ApiCall> {
        match self {
            CatalogError::Api { call, .. } | CatalogError::Network { call, .. } => Some(*call),
            _ => None,
        }
    }

    /// Get detailed diagnostic information about the error
    pub fn diagnostics(&self) -> String {
        match self {
            CatalogError::Format => {
                "Format Error\nThe document does not begin with #EXTM3U\nSuggestion: Make sure the file is an Extended-M3U playlist".to_string()
            }
            CatalogError::Api { call, status } => {
                format!(
                    "Server Error\nCall: {}\nStatus: {}\nSuggestion: {}",
                    call.display_name(),
                    status,
                    call.suggestion()
                )
            }
            CatalogError::Network { call, message } => {
                format!(
                    "Network Error\nCall: {}\nError: {}\nSuggestion: {}",
                    call.display_name(),
                    message,
                    call.suggestion()
                )
            }
            CatalogError::EmptyResult => {
                "Empty Playlist\nNo channels were found\nSuggestion: Check the source and its format".to_string()
            }
            CatalogError::ProxyUpstream { target, message } => {
                format!("Proxy Error\nTarget: {}\nError: {}\nSuggestion: The upstream server is unreachable", target, message)
            }
            CatalogError::InvalidSource { message } => {
                format!("Invalid Source\nReason: {}\nSuggestion: Edit the playlist settings", message)
            }
            CatalogError::Internal { message } => {
                format!("Internal Error\nMessage: {}\nSuggestion: Try again", message)
            }
        }
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;
