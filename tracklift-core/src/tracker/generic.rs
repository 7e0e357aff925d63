//! Default tracker behavior shared by every backend
//!
//! `GenericBackend` resolves transport settings once at construction and
//! implements the whole [`TrackerClient`] contract. Concrete backends wrap it,
//! reuse its helpers and override field naming or error parsing.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use url::Url;

use super::config::{AuthType, ConfigError, DEFAULT_COVER_FIELD, PayloadFormat, TrackerConfig};
use super::http::{HttpResponse, HttpSender, PreparedRequest, RequestBody};
use super::types::{
    CoverImage, ErrorKind, PayloadValue, StructuredError, TORRENT_CONTENT_TYPE, TORRENT_FIELD,
    TorrentAttachment, TrackerClient, Transport, UploadPayload, UploadResult,
};
use crate::release::ReleaseMetadata;
use crate::upload::UploadError;

/// Longest raw body excerpt kept in error messages
const ERROR_EXCERPT_CHARS: usize = 200;

/// Transport defaults a backend applies when the configuration is silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendDefaults {
    pub name: &'static str,
    pub auth_type: AuthType,
    pub payload_format: PayloadFormat,
    pub cover_field: &'static str,
}

/// Defaults of the plain generic backend.
pub const GENERIC_DEFAULTS: BackendDefaults = BackendDefaults {
    name: "generic",
    auth_type: AuthType::Bearer,
    payload_format: PayloadFormat::Form,
    cover_field: DEFAULT_COVER_FIELD,
};

/// Configuration-driven tracker backend.
pub struct GenericBackend {
    config: TrackerConfig,
    sender: Arc<dyn HttpSender>,
    backend_name: &'static str,
    auth_type: AuthType,
    payload_format: PayloadFormat,
    cover_field: String,
    transport: Transport,
}

impl GenericBackend {
    /// Creates a backend, resolving unset settings from `defaults`.
    pub fn new(config: TrackerConfig, sender: Arc<dyn HttpSender>, defaults: BackendDefaults) -> Self {
        let transport = select_transport(&config);
        let auth_type = config.auth_type.unwrap_or(defaults.auth_type);
        let payload_format = config.payload_format.unwrap_or(defaults.payload_format);
        let cover_field = config
            .cover_field
            .clone()
            .unwrap_or_else(|| defaults.cover_field.to_string());

        tracing::debug!(
            "[{} CONFIG] backend={}, api_key={}, upload_url={}, transport={:?}, auth={:?}, format={:?}",
            config.id,
            defaults.name,
            if config.has_api_key() { "SET" } else { "MISSING" },
            config.upload_url.as_deref().unwrap_or("MISSING"),
            transport,
            auth_type,
            payload_format
        );

        Self {
            config,
            sender,
            backend_name: defaults.name,
            auth_type,
            payload_format,
            cover_field,
            transport,
        }
    }

    /// Factory for the registry.
    pub fn create(config: TrackerConfig, sender: Arc<dyn HttpSender>) -> Arc<dyn TrackerClient> {
        Arc::new(Self::new(config, sender, GENERIC_DEFAULTS))
    }

    pub fn auth_type(&self) -> AuthType {
        self.auth_type
    }

    pub fn payload_format(&self) -> PayloadFormat {
        self.payload_format
    }

    pub fn cover_field(&self) -> &str {
        &self.cover_field
    }

    /// Upload endpoint, joined to the base URL when relative.
    ///
    /// # Errors
    /// - `ConfigError::NotConfigured` - No upload URL
    /// - `ConfigError::InvalidUrl` - The URL does not parse
    pub fn upload_url(&self) -> Result<Url, ConfigError> {
        let upload_url = self
            .config
            .upload_url
            .as_deref()
            .ok_or_else(|| ConfigError::NotConfigured {
                tracker: self.config.id.clone(),
                missing: vec!["upload_url"],
            })?;

        let invalid = |reason: String| ConfigError::InvalidUrl {
            tracker: self.config.id.clone(),
            url: upload_url.to_string(),
            reason,
        };

        match Url::parse(upload_url) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self
                    .config
                    .base_url
                    .as_deref()
                    .ok_or_else(|| invalid("relative upload URL without base URL".to_string()))?;
                Url::parse(base)
                    .and_then(|base| base.join(upload_url))
                    .map_err(|e| invalid(e.to_string()))
            }
            Err(e) => Err(invalid(e.to_string())),
        }
    }

    /// Category ID for the release type.
    ///
    /// # Errors
    /// - `ConfigError::UnmappedValue` - No `category_ids` entry
    pub fn category_id(&self, metadata: &ReleaseMetadata) -> Result<String, ConfigError> {
        self.lookup("category_ids", &self.config.category_ids, metadata.release_type_key())
    }

    /// Format ID for the audio format.
    ///
    /// # Errors
    /// - `ConfigError::UnmappedValue` - No `format_ids` entry
    pub fn format_id(&self, metadata: &ReleaseMetadata) -> Result<String, ConfigError> {
        self.lookup("format_ids", &self.config.format_ids, metadata.format_key())
    }

    /// Resolution ID for `key`.
    ///
    /// # Errors
    /// - `ConfigError::UnmappedValue` - No `resolution_ids` entry
    pub fn resolution_id(&self, key: &str) -> Result<String, ConfigError> {
        self.lookup("resolution_ids", &self.config.resolution_ids, key.to_uppercase())
    }

    fn lookup(
        &self,
        map_name: &'static str,
        map: &std::collections::BTreeMap<String, String>,
        key: String,
    ) -> Result<String, ConfigError> {
        map.get(&key).cloned().ok_or(ConfigError::UnmappedValue {
            tracker: self.config.id.clone(),
            map: map_name,
            key,
        })
    }

    pub fn anonymous_flag(&self) -> &'static str {
        if self.config.anonymous { "1" } else { "0" }
    }

    /// Empty payload in this backend's format.
    pub fn new_payload(&self) -> UploadPayload {
        UploadPayload::new(self.config.id.clone(), self.payload_format)
    }

    /// Adds the torrent and, when present, the cover under the configured field.
    ///
    /// # Errors
    /// - `UploadError::UnsupportedFormat` - Cover type not accepted
    pub fn attach_files(
        &self,
        payload: &mut UploadPayload,
        torrent: &TorrentAttachment,
        cover: Option<&CoverImage>,
    ) -> Result<(), UploadError> {
        payload.set_file(
            TORRENT_FIELD,
            &torrent.file_name,
            TORRENT_CONTENT_TYPE,
            torrent.bytes.clone(),
        );
        if let Some(cover) = cover {
            cover.ensure_supported()?;
            payload.set_file(
                &self.cover_field,
                &cover.file_name,
                &cover.content_type,
                cover.bytes.clone(),
            );
        }
        Ok(())
    }

    /// Encodes the payload and attaches credentials for the selected transport.
    ///
    /// # Errors
    /// - `UploadError::Config` - Upload URL cannot be resolved
    pub fn prepare(&self, payload: &UploadPayload) -> Result<PreparedRequest, UploadError> {
        let mut url = self.upload_url()?;
        let mut headers = vec![("Accept".to_string(), "application/json".to_string())];
        let mut extra_fields = Vec::new();
        let key = self.config.api_key.as_str();
        let json_body = self.transport == Transport::Api && payload.format == PayloadFormat::Json;

        if self.transport == Transport::WebForm
            && let Some(base) = self.config.base_url.as_deref()
        {
            headers.push(("Referer".to_string(), base.to_string()));
            if let Ok(base) = Url::parse(base) {
                headers.push(("Origin".to_string(), base.origin().ascii_serialization()));
            }
        }

        if !key.is_empty() {
            match self.auth_type {
                AuthType::Bearer => {
                    headers.push(("Authorization".to_string(), format!("Bearer {key}")));
                }
                AuthType::Token => {
                    headers.push((self.config.token_header.clone(), key.to_string()));
                }
                AuthType::Param if json_body => {
                    url.query_pairs_mut()
                        .append_pair(&self.config.auth_param, key);
                }
                AuthType::Param => {
                    extra_fields.push((self.config.auth_param.clone(), PayloadValue::text(key)));
                }
            }
        } else if self.transport == Transport::WebForm && self.config.has_login() {
            let credentials = format!("{}:{}", self.config.username, self.config.password);
            headers.push((
                "Authorization".to_string(),
                format!("Basic {}", BASE64.encode(credentials)),
            ));
        }

        let body = if json_body {
            let mut object = serde_json::Map::new();
            for (name, value) in &payload.fields {
                let encoded = match value {
                    PayloadValue::Text(text) => text.clone(),
                    PayloadValue::File { bytes, .. } => BASE64.encode(bytes),
                };
                object.insert(name.clone(), serde_json::Value::String(encoded));
            }
            RequestBody::Json(serde_json::Value::Object(object))
        } else {
            let mut parts: Vec<(String, PayloadValue)> = payload
                .fields
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect();
            parts.extend(extra_fields);
            RequestBody::Multipart(parts)
        };

        Ok(PreparedRequest {
            url,
            transport: self.transport,
            headers,
            body,
        })
    }

    /// Prepares, sends and interprets one attempt on behalf of `client`.
    ///
    /// Request construction and error parsing go through `client`, so a
    /// wrapping backend's overrides apply.
    ///
    /// # Errors
    /// - `UploadError::Transport` - No response, or a 5xx
    /// - `UploadError::Auth` - 401 or 403
    /// - `UploadError::Rejected` - Other 4xx, or `success: false`
    pub async fn dispatch(
        &self,
        client: &dyn TrackerClient,
        payload: &UploadPayload,
    ) -> Result<UploadResult, UploadError> {
        let request = client.prepare_request(payload)?;
        let endpoint = endpoint_label(&request.url);

        tracing::debug!("[{}] POST {}", self.config.id, endpoint);
        let response = self
            .sender
            .send(&request)
            .await
            .map_err(|e| UploadError::Transport {
                url: endpoint.clone(),
                message: e.to_string(),
                status: None,
            })?;

        self.interpret(client, &endpoint, response)
    }

    fn interpret(
        &self,
        client: &dyn TrackerClient,
        endpoint: &str,
        response: HttpResponse,
    ) -> Result<UploadResult, UploadError> {
        let status = response.status;
        match status {
            200..=299 => self.parse_success(&response),
            401 | 403 => {
                let error = client.parse_error_response(status, &response.body);
                tracing::warn!("[{}] Authentication rejected ({})", self.config.id, status);
                Err(UploadError::Auth {
                    status,
                    message: error.message,
                })
            }
            500..=599 => {
                let error = client.parse_error_response(status, &response.body);
                tracing::warn!("[{}] Server error {}: {}", self.config.id, status, error.message);
                Err(UploadError::Transport {
                    url: endpoint.to_string(),
                    message: error.message,
                    status: Some(status),
                })
            }
            _ => {
                let error = client.parse_error_response(status, &response.body);
                tracing::warn!("[{}] Upload rejected ({}): {}", self.config.id, status, error);
                Err(UploadError::Rejected(error))
            }
        }
    }

    /// Reads `{success, message, data}` bodies; anything else is a plain success.
    fn parse_success(&self, response: &HttpResponse) -> Result<UploadResult, UploadError> {
        let mut result = UploadResult::success(self.config.id.clone());
        result.message = Some("Upload successful".to_string());

        if !response.is_json() {
            return Ok(result);
        }
        let Ok(serde_json::Value::Object(body)) =
            serde_json::from_slice::<serde_json::Value>(&response.body)
        else {
            return Ok(result);
        };

        let message = body
            .get("message")
            .or_else(|| body.get("error"))
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);

        if body.get("success").and_then(serde_json::Value::as_bool) == Some(false) {
            let message = message.unwrap_or_else(|| "Tracker reported failure".to_string());
            return Err(UploadError::Rejected(
                StructuredError::new(ErrorKind::TrackerRejection, message).with_status(response.status),
            ));
        }

        if message.is_some() {
            result.message = message;
        }

        match body.get("data") {
            Some(serde_json::Value::String(data)) if is_http_url(data) => {
                result.url = Some(data.clone());
            }
            Some(serde_json::Value::Object(data)) => {
                result.remote_id = data.get("id").and_then(scalar_string);
                result.url = ["url", "download_link", "details_link"]
                    .iter()
                    .find_map(|key| data.get(*key).and_then(serde_json::Value::as_str))
                    .map(str::to_string);
            }
            Some(other) => result.remote_id = scalar_string(other),
            None => {}
        }

        if result.remote_id.is_none() {
            result.remote_id = body.get("id").and_then(scalar_string);
        }
        if result.url.is_none() {
            result.url = body
                .get("url")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string);
        }

        Ok(result)
    }
}

/// API transport when `use_api` is set, or unset and the upload URL mentions `api`.
pub fn select_transport(config: &TrackerConfig) -> Transport {
    let use_api = config.use_api.unwrap_or_else(|| {
        config
            .upload_url
            .as_deref()
            .is_some_and(|url| url.to_lowercase().contains("api"))
    });

    if use_api {
        Transport::Api
    } else {
        Transport::WebForm
    }
}

/// Required settings absent for `transport`.
pub fn missing_fields(config: &TrackerConfig, transport: Transport) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if config.upload_url.is_none() {
        missing.push("upload_url");
    }
    match transport {
        Transport::Api if !config.has_api_key() => missing.push("api_key"),
        Transport::WebForm if !config.has_api_key() && !config.has_login() => {
            missing.push("api_key or username/password");
        }
        _ => {}
    }
    missing
}

/// Generic error body parsing: JSON `error`/`message`/`errors`, or a raw excerpt.
pub fn parse_error_body(status: u16, body: &[u8]) -> StructuredError {
    let kind = match status {
        401 | 403 => ErrorKind::Auth,
        500..=599 => ErrorKind::Transport,
        _ => ErrorKind::TrackerRejection,
    };

    let text = String::from_utf8_lossy(body);
    let excerpt: String = text.trim().chars().take(ERROR_EXCERPT_CHARS).collect();
    let mut error = StructuredError::new(kind, format!("{status} - {excerpt}")).with_status(status);

    if let Ok(serde_json::Value::Object(json)) = serde_json::from_slice::<serde_json::Value>(body) {
        if let Some(message) = ["error", "message"]
            .iter()
            .find_map(|key| json.get(*key).and_then(serde_json::Value::as_str))
        {
            error.message = message.to_string();
        }
        if let Some(serde_json::Value::Object(errors)) = json.get("errors") {
            error.details = errors
                .iter()
                .map(|(field, messages)| format!("{field}: {}", join_messages(messages)))
                .collect();
        }
    }

    error
}

fn join_messages(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).unwrap_or_else(|| item.to_string()))
            .collect::<Vec<_>>()
            .join(", "),
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn scalar_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(text) if !text.is_empty() => Some(text.clone()),
        serde_json::Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// URL without query string, so credentials never reach error messages.
fn endpoint_label(url: &Url) -> String {
    let mut label = url.clone();
    label.set_query(None);
    label.to_string()
}

#[async_trait]
impl TrackerClient for GenericBackend {
    fn tracker_id(&self) -> &str {
        &self.config.id
    }

    fn backend_name(&self) -> &'static str {
        self.backend_name
    }

    fn config(&self) -> &TrackerConfig {
        &self.config
    }

    fn transport(&self) -> Transport {
        self.transport
    }

    fn missing_fields(&self) -> Vec<&'static str> {
        missing_fields(&self.config, self.transport)
    }

    fn build_payload(
        &self,
        metadata: &ReleaseMetadata,
        description: &str,
        torrent: &TorrentAttachment,
        cover: Option<&CoverImage>,
    ) -> Result<UploadPayload, UploadError> {
        let mut payload = self.new_payload();
        payload.set_text("name", metadata.upload_name());
        payload.set_text("description", description);
        payload.set_text("category_id", self.category_id(metadata)?);
        payload.set_text("format_id", self.format_id(metadata)?);
        payload.set_text("anonymous", self.anonymous_flag());
        self.attach_files(&mut payload, torrent, cover)?;
        Ok(payload)
    }

    fn prepare_request(&self, payload: &UploadPayload) -> Result<PreparedRequest, UploadError> {
        self.prepare(payload)
    }

    async fn upload(&self, payload: &UploadPayload) -> Result<UploadResult, UploadError> {
        self.dispatch(self, payload).await
    }

    fn parse_error_response(&self, status: u16, body: &[u8]) -> StructuredError {
        parse_error_body(status, body)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::tracker::test_mocks::RecordingSender;

    fn config() -> TrackerConfig {
        let mut config = TrackerConfig::new("GEN");
        config.api_key = "abcdef123456".to_string();
        config.base_url = Some("https://gen.example".to_string());
        config.upload_url = Some("/api/torrents/upload".to_string());
        config.category_ids.insert("ALBUM".to_string(), "7".to_string());
        config.format_ids.insert("FLAC".to_string(), "1".to_string());
        config
    }

    fn backend(config: TrackerConfig, sender: Arc<RecordingSender>) -> GenericBackend {
        GenericBackend::new(config, sender, GENERIC_DEFAULTS)
    }

    fn metadata() -> ReleaseMetadata {
        ReleaseMetadata {
            artist: "Artist".to_string(),
            album: "Album".to_string(),
            year: Some(2001),
            format: "FLAC".to_string(),
            ..Default::default()
        }
    }

    fn torrent() -> TorrentAttachment {
        TorrentAttachment::new(
            Bytes::from_static(b"d4:infod6:lengthi1e4:name1:x12:piece lengthi16384e6:pieces20:aaaaaaaaaaaaaaaaaaaaee"),
            "x.torrent",
        )
        .unwrap()
    }

    #[test]
    fn test_transport_selection() {
        let mut config = config();
        assert_eq!(select_transport(&config), Transport::Api);

        config.upload_url = Some("https://gen.example/upload.php".to_string());
        assert_eq!(select_transport(&config), Transport::WebForm);

        config.use_api = Some(true);
        assert_eq!(select_transport(&config), Transport::Api);

        config.upload_url = Some("https://gen.example/API/upload".to_string());
        config.use_api = Some(false);
        assert_eq!(select_transport(&config), Transport::WebForm);
    }

    #[test]
    fn test_missing_fields_per_transport() {
        let mut config = config();
        config.api_key.clear();
        assert_eq!(missing_fields(&config, Transport::Api), vec!["api_key"]);
        assert_eq!(
            missing_fields(&config, Transport::WebForm),
            vec!["api_key or username/password"]
        );

        config.username = "user".to_string();
        config.password = "pass".to_string();
        assert!(missing_fields(&config, Transport::WebForm).is_empty());

        config.upload_url = None;
        assert_eq!(missing_fields(&config, Transport::WebForm), vec!["upload_url"]);
    }

    #[test]
    fn test_relative_upload_url_joined() {
        let backend = backend(config(), Arc::new(RecordingSender::new()));
        assert_eq!(
            backend.upload_url().unwrap().as_str(),
            "https://gen.example/api/torrents/upload"
        );
    }

    #[test]
    fn test_build_payload_fields() {
        let backend = backend(config(), Arc::new(RecordingSender::new()));
        let cover = CoverImage::new(vec![1u8, 2, 3], "image/png", "cover.png").unwrap();
        let payload = backend
            .build_payload(&metadata(), "desc", &torrent(), Some(&cover))
            .unwrap();

        assert_eq!(payload.text("name"), Some("Artist - Album (2001) FLAC"));
        assert_eq!(payload.text("category_id"), Some("7"));
        assert_eq!(payload.text("format_id"), Some("1"));
        assert_eq!(payload.text("anonymous"), Some("0"));
        assert!(payload.file("torrent").is_some());
        assert_eq!(payload.file("image").map(|(_, ct, _)| ct), Some("image/png"));
    }

    #[test]
    fn test_unmapped_category() {
        let backend = backend(config(), Arc::new(RecordingSender::new()));
        let metadata = ReleaseMetadata {
            release_type: Some("Compilation".to_string()),
            ..metadata()
        };
        let result = backend.build_payload(&metadata, "desc", &torrent(), None);
        assert!(matches!(
            result,
            Err(UploadError::Config(ConfigError::UnmappedValue { map: "category_ids", .. }))
        ));
    }

    #[test]
    fn test_json_body_encodes_files_as_base64() {
        let mut config = config();
        config.payload_format = Some(PayloadFormat::Json);
        config.auth_type = Some(AuthType::Param);
        let backend = backend(config, Arc::new(RecordingSender::new()));

        let payload = backend.build_payload(&metadata(), "desc", &torrent(), None).unwrap();
        let request = backend.prepare(&payload).unwrap();

        assert_eq!(request.query_param("api_token").as_deref(), Some("abcdef123456"));
        let RequestBody::Json(body) = &request.body else {
            panic!("expected JSON body");
        };
        let encoded = body.get("torrent").and_then(serde_json::Value::as_str).unwrap();
        assert_eq!(BASE64.decode(encoded).unwrap(), torrent().bytes.to_vec());
    }

    #[test]
    fn test_web_form_login_uses_basic_auth() {
        let mut config = config();
        config.api_key.clear();
        config.username = "user".to_string();
        config.password = "pass".to_string();
        config.upload_url = Some("https://gen.example/upload.php".to_string());
        let backend = backend(config, Arc::new(RecordingSender::new()));

        let payload = backend.build_payload(&metadata(), "desc", &torrent(), None).unwrap();
        let request = backend.prepare(&payload).unwrap();

        assert_eq!(request.transport, Transport::WebForm);
        assert_eq!(request.header("authorization"), Some("Basic dXNlcjpwYXNz"));
        assert_eq!(request.header("origin"), Some("https://gen.example"));
    }

    #[test]
    fn test_parse_error_body_variants() {
        let json = br#"{"message": "Validation failed", "errors": {"category_id": ["invalid"], "name": "taken"}}"#;
        let error = parse_error_body(422, json);
        assert_eq!(error.kind, ErrorKind::TrackerRejection);
        assert_eq!(error.message, "Validation failed");
        assert_eq!(error.details, vec!["category_id: invalid", "name: taken"]);

        let error = parse_error_body(400, br#"{"error": "Duplicate"}"#);
        assert_eq!(error.message, "Duplicate");

        let long = "x".repeat(500);
        let error = parse_error_body(404, long.as_bytes());
        assert_eq!(error.message, format!("404 - {}", "x".repeat(200)));
        assert_eq!(error.status, Some(404));
    }

    #[tokio::test]
    async fn test_success_response_parsing() {
        let sender = Arc::new(RecordingSender::new());
        sender.push_json(200, r#"{"success": true, "message": "Uploaded", "data": {"id": 42, "url": "https://gen.example/t/42"}}"#);
        let backend = backend(config(), Arc::clone(&sender));
        let payload = backend.build_payload(&metadata(), "desc", &torrent(), None).unwrap();

        let result = backend.upload(&payload).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.remote_id.as_deref(), Some("42"));
        assert_eq!(result.url.as_deref(), Some("https://gen.example/t/42"));
        assert_eq!(result.message.as_deref(), Some("Uploaded"));
        assert_eq!(sender.call_count(), 1);
    }

    #[tokio::test]
    async fn test_success_false_is_rejection() {
        let sender = Arc::new(RecordingSender::new());
        sender.push_json(200, r#"{"success": false, "message": "Dupe"}"#);
        let backend = backend(config(), Arc::clone(&sender));
        let payload = backend.build_payload(&metadata(), "desc", &torrent(), None).unwrap();

        let error = backend.upload(&payload).await.unwrap_err();
        assert!(matches!(error, UploadError::Rejected(ref e) if e.message == "Dupe"));
    }

    #[tokio::test]
    async fn test_html_success_page_is_plain_success() {
        let sender = Arc::new(RecordingSender::new());
        sender.push_text(200, "<html><body>Upload complete</body></html>");
        sender.push_text(200, r#"{"success": true, "data": {"id": 9}}"#);
        let backend = backend(config(), Arc::clone(&sender));
        let payload = backend.build_payload(&metadata(), "desc", &torrent(), None).unwrap();

        let result = backend.upload(&payload).await.unwrap();
        assert_eq!(result.message.as_deref(), Some("Upload successful"));
        assert_eq!(result.remote_id, None);

        // JSON served as text/html is still read.
        let result = backend.upload(&payload).await.unwrap();
        assert_eq!(result.remote_id.as_deref(), Some("9"));
    }

    #[tokio::test]
    async fn test_status_classification() {
        let cases: [(u16, ErrorKind); 4] = [
            (401, ErrorKind::Auth),
            (403, ErrorKind::Auth),
            (503, ErrorKind::Transport),
            (400, ErrorKind::TrackerRejection),
        ];
        for (status, kind) in cases {
            let sender = Arc::new(RecordingSender::new());
            sender.push_json(status, r#"{"message": "nope"}"#);
            let backend = backend(config(), Arc::clone(&sender));
            let payload = backend.build_payload(&metadata(), "desc", &torrent(), None).unwrap();

            let error = backend.upload(&payload).await.unwrap_err();
            assert_eq!(error.kind(), kind, "status {status}");
        }
    }
}
