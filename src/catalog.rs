use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Group assigned to channels whose source did not name one
pub const DEFAULT_GROUP: &str = "General";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceKind {
    /// `source` is an http(s) location of an M3U document
    Url,
    /// `source` is the raw M3U text itself
    File,
    /// `source` is the base URL of an Xtream Codes server
    Xtream,
}

/// Xtream login. The password is wiped from memory when dropped.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: Option<String>) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }

    /// Password as used in Xtream URLs, where "no password" is an empty segment
    pub fn password_or_empty(&self) -> &str {
        self.password.as_deref().unwrap_or("")
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .finish()
    }
}

impl Drop for Credentials {
    fn drop(&mut self) {
        if let Some(password) = self.password.as_mut() {
            password.zeroize();
        }
    }
}

/// A channel list source as registered by the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistSource {
    pub kind: SourceKind,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

impl PlaylistSource {
    pub fn url(location: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Url,
            source: location.into(),
            credentials: None,
        }
    }

    pub fn file(content: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::File,
            source: content.into(),
            credentials: None,
        }
    }

    pub fn xtream(base_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            kind: SourceKind::Xtream,
            source: base_url.into(),
            credentials: Some(credentials),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Channel {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    pub url: String,
    pub group: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epg_id: Option<String>,
}

impl Channel {
    /// Builds a channel whose id is derived from its group, name and url.
    /// A missing or empty group becomes [`DEFAULT_GROUP`].
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        group: Option<String>,
        logo: Option<String>,
        epg_id: Option<String>,
    ) -> Self {
        let name = name.into();
        let url = url.into();
        let group = normalize_group(group);
        Self {
            id: derive_channel_id(&group, &name, &url),
            name,
            logo,
            url,
            group,
            epg_id,
        }
    }

    /// Builds a channel with a provider-assigned id (Xtream `stream_id`)
    pub fn with_id(
        id: impl Into<String>,
        name: impl Into<String>,
        url: impl Into<String>,
        group: Option<String>,
        logo: Option<String>,
        epg_id: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            logo,
            url: url.into(),
            group: normalize_group(group),
            epg_id,
        }
    }
}

/// `group-name-url`. Not unique when two entries share all three fields.
pub fn derive_channel_id(group: &str, name: &str, url: &str) -> String {
    format!("{}-{}-{}", group, name, url)
}

pub fn normalize_group(group: Option<String>) -> String {
    match group {
        Some(g) if !g.is_empty() => g,
        _ => DEFAULT_GROUP.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub channels: Vec<Channel>,
}
