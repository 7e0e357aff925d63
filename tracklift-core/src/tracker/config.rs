//! Per-tracker configuration loaded from JSON
//!
//! The file looks like `{"trackers": {"YUS": {...}, "SP": {...}}}`. Values are
//! normalized once at load: strings are trimmed, lookup-map keys are
//! upper-cased and URLs are validated. Nothing is re-resolved per upload.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

/// Default query/body parameter carrying the api key for `param` auth
pub const DEFAULT_AUTH_PARAM: &str = "api_token";

/// Default header carrying the api key for `token` auth
pub const DEFAULT_TOKEN_HEADER: &str = "X-API-Token";

/// Default multipart field for cover images
pub const DEFAULT_COVER_FIELD: &str = "image";

/// How the api key is attached to API requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// Named parameter in the query string or body
    Param,
    /// Custom header, `X-API-Token` by default
    Token,
}

/// Body encoding for API uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    Json,
    Form,
}

/// Errors in tracker configuration. All are detected before any network call.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Tracker {tracker} is not configured, missing: {}", .missing.join(", "))]
    NotConfigured {
        tracker: String,
        missing: Vec<&'static str>,
    },

    #[error("Tracker {tracker} has no {map} entry for '{key}'")]
    UnmappedValue {
        tracker: String,
        map: &'static str,
        key: String,
    },

    #[error("Tracker {tracker} is disabled")]
    Disabled { tracker: String },

    #[error("Tracker {tracker} has invalid URL '{url}': {reason}")]
    InvalidUrl {
        tracker: String,
        url: String,
        reason: String,
    },

    #[error("Unknown tracker: {tracker}")]
    UnknownTracker { tracker: String },

    #[error("Failed to parse tracker configuration: {reason}")]
    Parse { reason: String },

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Settings for one tracker.
///
/// Optional transport settings (`auth_type`, `payload_format`,
/// `cover_field`) fall back to the backend's defaults when the backend is
/// constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Identifier, taken from the key in the `trackers` map
    #[serde(skip)]
    pub id: String,
    pub enabled: bool,
    /// Registry key of the backend; defaults to `id`
    pub backend: Option<String>,
    pub api_key: String,
    pub username: String,
    pub password: String,
    #[serde(alias = "url", alias = "site_url")]
    pub base_url: Option<String>,
    pub upload_url: Option<String>,
    pub announce_url: Option<String>,
    #[serde(alias = "api_auth_type")]
    pub auth_type: Option<AuthType>,
    pub auth_param: String,
    pub token_header: String,
    #[serde(alias = "api_format")]
    pub payload_format: Option<PayloadFormat>,
    #[serde(deserialize_with = "id_map")]
    pub category_ids: BTreeMap<String, String>,
    #[serde(deserialize_with = "id_map")]
    pub format_ids: BTreeMap<String, String>,
    #[serde(deserialize_with = "id_map")]
    pub resolution_ids: BTreeMap<String, String>,
    #[serde(alias = "cover_field_name")]
    pub cover_field: Option<String>,
    /// Forces API (`true`) or web-form (`false`) transport
    pub use_api: Option<bool>,
    #[serde(alias = "anon")]
    pub anonymous: bool,
    /// Torrent `source` tag written when retargeting
    #[serde(alias = "source_name")]
    pub source: Option<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            enabled: true,
            backend: None,
            api_key: String::new(),
            username: String::new(),
            password: String::new(),
            base_url: None,
            upload_url: None,
            announce_url: None,
            auth_type: None,
            auth_param: DEFAULT_AUTH_PARAM.to_string(),
            token_header: DEFAULT_TOKEN_HEADER.to_string(),
            payload_format: None,
            category_ids: BTreeMap::new(),
            format_ids: BTreeMap::new(),
            resolution_ids: BTreeMap::new(),
            cover_field: None,
            use_api: None,
            anonymous: false,
            source: None,
        }
    }
}

impl TrackerConfig {
    /// Creates an empty configuration for `id`.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into().trim().to_uppercase(),
            ..Self::default()
        }
    }

    /// Registry key used to pick the backend.
    pub fn backend_key(&self) -> &str {
        self.backend.as_deref().unwrap_or(&self.id)
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub fn has_login(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    /// Trims values, upper-cases lookup keys and validates URLs.
    ///
    /// # Errors
    /// - `ConfigError::InvalidUrl` - An absolute URL failed to parse, or a
    ///   relative upload URL has no base URL to join
    pub fn normalize(mut self) -> Result<Self, ConfigError> {
        self.id = self.id.trim().to_uppercase();
        self.api_key = self.api_key.trim().to_string();
        self.username = self.username.trim().to_string();
        self.password = self.password.trim().to_string();
        self.auth_param = non_empty_or(&self.auth_param, DEFAULT_AUTH_PARAM);
        self.token_header = non_empty_or(&self.token_header, DEFAULT_TOKEN_HEADER);

        for value in [
            &mut self.backend,
            &mut self.base_url,
            &mut self.upload_url,
            &mut self.announce_url,
            &mut self.cover_field,
            &mut self.source,
        ] {
            *value = value
                .take()
                .map(|inner| inner.trim().to_string())
                .filter(|inner| !inner.is_empty());
        }
        if let Some(backend) = &mut self.backend {
            *backend = backend.to_lowercase();
        }

        for map in [
            &mut self.category_ids,
            &mut self.format_ids,
            &mut self.resolution_ids,
        ] {
            *map = std::mem::take(map)
                .into_iter()
                .map(|(key, value)| (key.trim().to_uppercase(), value.trim().to_string()))
                .collect();
        }

        for url in [&self.base_url, &self.announce_url].into_iter().flatten() {
            self.check_absolute(url)?;
        }
        if let Some(upload_url) = &self.upload_url {
            if is_absolute(upload_url) {
                self.check_absolute(upload_url)?;
            } else if self.base_url.is_none() {
                return Err(ConfigError::InvalidUrl {
                    tracker: self.id.clone(),
                    url: upload_url.clone(),
                    reason: "relative upload URL requires a base URL".to_string(),
                });
            }
        }

        Ok(self)
    }

    fn check_absolute(&self, url: &str) -> Result<(), ConfigError> {
        url::Url::parse(url)
            .map(|_| ())
            .map_err(|e| ConfigError::InvalidUrl {
                tracker: self.id.clone(),
                url: url.to_string(),
                reason: e.to_string(),
            })
    }
}

fn is_absolute(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn non_empty_or(value: &str, fallback: &str) -> String {
    match value.trim() {
        "" => fallback.to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// Accepts IDs written as strings or numbers.
fn id_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| match value {
            serde_json::Value::String(id) => Ok((key, id)),
            serde_json::Value::Number(id) => Ok((key, id.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "ID for '{key}' must be a string or number, got {other}"
            ))),
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    trackers: BTreeMap<String, TrackerConfig>,
}

/// All configured trackers, keyed by upper-cased identifier.
#[derive(Debug, Clone, Default)]
pub struct TrackerConfigSet {
    trackers: BTreeMap<String, TrackerConfig>,
}

impl TrackerConfigSet {
    /// Parses and normalizes a JSON configuration document.
    ///
    /// # Errors
    /// - `ConfigError::Parse` - Malformed JSON or wrong field types
    /// - `ConfigError::InvalidUrl` - A tracker has an unusable URL
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = serde_json::from_str(json).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;

        let mut set = Self::default();
        for (id, mut config) in file.trackers {
            config.id = id;
            set.insert(config)?;
        }

        tracing::debug!("Loaded {} tracker configurations", set.len());
        Ok(set)
    }

    /// Reads and parses a JSON configuration file.
    ///
    /// # Errors
    /// - `ConfigError::Io` - The file could not be read
    /// - Everything [`TrackerConfigSet::from_json_str`] returns
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json_str(&json)
    }

    /// Normalizes and adds a configuration, replacing any with the same id.
    ///
    /// # Errors
    /// - `ConfigError::InvalidUrl` - A URL failed validation
    pub fn insert(&mut self, config: TrackerConfig) -> Result<(), ConfigError> {
        let config = config.normalize()?;
        self.trackers.insert(config.id.clone(), config);
        Ok(())
    }

    /// Looks up a tracker case-insensitively.
    ///
    /// # Errors
    /// - `ConfigError::UnknownTracker` - No tracker with this id
    pub fn get(&self, id: &str) -> Result<&TrackerConfig, ConfigError> {
        self.trackers
            .get(&id.trim().to_uppercase())
            .ok_or_else(|| ConfigError::UnknownTracker {
                tracker: id.to_string(),
            })
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.trackers.keys().map(String::as_str)
    }

    /// Enabled trackers only.
    pub fn enabled(&self) -> impl Iterator<Item = &TrackerConfig> {
        self.trackers.values().filter(|config| config.enabled)
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }
}
