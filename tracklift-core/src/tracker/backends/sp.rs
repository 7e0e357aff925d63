//! SP backend
//!
//! Form uploads authenticated with an `api_token` parameter. The upload form
//! is shared with non-music categories, so several fields the site requires
//! are always sent as zero. Validation failures come back as `422` with
//! per-field `errors`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::release::ReleaseMetadata;
use crate::tracker::config::{AuthType, PayloadFormat, TrackerConfig};
use crate::tracker::generic::{BackendDefaults, GenericBackend, parse_error_body};
use crate::tracker::http::{HttpSender, PreparedRequest};
use crate::tracker::types::{
    CoverImage, StructuredError, TorrentAttachment, TrackerClient, Transport, UploadPayload,
    UploadResult,
};
use crate::upload::UploadError;

pub const SP_DEFAULTS: BackendDefaults = BackendDefaults {
    name: "sp",
    auth_type: AuthType::Param,
    payload_format: PayloadFormat::Form,
    cover_field: "torrent-cover",
};

/// Resolution ID used when `resolution_ids` has no `OTHER` entry
const DEFAULT_RESOLUTION_ID: &str = "10";

/// Fields the site requires that have no meaning for music
const ZERO_FIELDS: &[&str] = &[
    "tmdb",
    "imdb",
    "tvdb",
    "mal",
    "igdb",
    "stream",
    "sd",
    "personal_release",
    "internal",
    "featured",
    "free",
    "doubleup",
    "sticky",
];

pub struct SpBackend {
    inner: GenericBackend,
}

impl SpBackend {
    pub fn new(config: TrackerConfig, sender: Arc<dyn HttpSender>) -> Self {
        Self {
            inner: GenericBackend::new(config, sender, SP_DEFAULTS),
        }
    }

    pub fn create(config: TrackerConfig, sender: Arc<dyn HttpSender>) -> Arc<dyn TrackerClient> {
        Arc::new(Self::new(config, sender))
    }

    fn resolution_id(&self) -> String {
        self.inner
            .resolution_id("OTHER")
            .unwrap_or_else(|_| DEFAULT_RESOLUTION_ID.to_string())
    }
}

fn keywords(metadata: &ReleaseMetadata) -> String {
    let mut keywords: Vec<&str> = metadata
        .genres
        .iter()
        .map(|genre| genre.trim())
        .filter(|genre| !genre.is_empty())
        .collect();
    if !metadata.album.trim().is_empty() {
        keywords.push(metadata.album.trim());
    }
    keywords.join(", ")
}

#[async_trait]
impl TrackerClient for SpBackend {
    fn tracker_id(&self) -> &str {
        self.inner.tracker_id()
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    fn config(&self) -> &TrackerConfig {
        self.inner.config()
    }

    fn transport(&self) -> Transport {
        self.inner.transport()
    }

    fn missing_fields(&self) -> Vec<&'static str> {
        self.inner.missing_fields()
    }

    fn build_payload(
        &self,
        metadata: &ReleaseMetadata,
        description: &str,
        torrent: &TorrentAttachment,
        cover: Option<&CoverImage>,
    ) -> Result<UploadPayload, UploadError> {
        let mut payload = self.inner.new_payload();
        payload.set_text("name", metadata.upload_name());
        payload.set_text("description", description);
        payload.set_text("category_id", self.inner.category_id(metadata)?);
        payload.set_text("type_id", self.inner.format_id(metadata)?);
        payload.set_text("resolution_id", self.resolution_id());
        payload.set_text("keywords", keywords(metadata));
        payload.set_text("anonymous", self.inner.anonymous_flag());
        for field in ZERO_FIELDS {
            payload.set_text(field, "0");
        }
        self.inner.attach_files(&mut payload, torrent, cover)?;
        Ok(payload)
    }

    fn prepare_request(&self, payload: &UploadPayload) -> Result<PreparedRequest, UploadError> {
        self.inner.prepare(payload)
    }

    async fn upload(&self, payload: &UploadPayload) -> Result<UploadResult, UploadError> {
        self.inner.dispatch(self, payload).await
    }

    fn parse_error_response(&self, status: u16, body: &[u8]) -> StructuredError {
        let mut error = parse_error_body(status, body);
        if status == 422 {
            if error.details.iter().any(|detail| detail.starts_with("category")) {
                error
                    .details
                    .push("check category_ids for this tracker".to_string());
            }
            if error.details.iter().any(|detail| detail.contains("cover")) {
                error.details.push(format!(
                    "cover is sent as '{}'",
                    self.inner.cover_field()
                ));
            }
        }
        error
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::tracker::test_mocks::RecordingSender;
    use crate::tracker::types::ErrorKind;

    fn config() -> TrackerConfig {
        let mut config = TrackerConfig::new("SP");
        config.api_key = "sp-token-xyz".to_string();
        config.base_url = Some("https://sp.example".to_string());
        config.upload_url = Some("/api/torrents/upload".to_string());
        config.category_ids.insert("ALBUM".to_string(), "5".to_string());
        config.format_ids.insert("FLAC".to_string(), "16".to_string());
        config
    }

    fn metadata() -> ReleaseMetadata {
        ReleaseMetadata {
            artist: "Ekatarina Velika".to_string(),
            album: "S'vetom na ti".to_string(),
            year: Some(1985),
            format: "FLAC".to_string(),
            genres: vec!["New Wave".to_string(), " ".to_string()],
            ..Default::default()
        }
    }

    fn torrent() -> TorrentAttachment {
        TorrentAttachment::new(
            Bytes::from_static(b"d4:infod6:lengthi1e4:name1:x12:piece lengthi16384e6:pieces20:ccccccccccccccccccccee"),
            "x.torrent",
        )
        .unwrap()
    }

    #[test]
    fn test_sp_payload() {
        let backend = SpBackend::new(config(), Arc::new(RecordingSender::new()));
        let cover = CoverImage::new(vec![1u8], "webp", "cover.webp").unwrap();
        let payload = backend
            .build_payload(&metadata(), "desc", &torrent(), Some(&cover))
            .unwrap();

        assert_eq!(payload.text("name"), Some("Ekatarina Velika - S'vetom na ti (1985) FLAC"));
        assert_eq!(payload.text("category_id"), Some("5"));
        assert_eq!(payload.text("type_id"), Some("16"));
        assert_eq!(payload.text("resolution_id"), Some(DEFAULT_RESOLUTION_ID));
        assert_eq!(payload.text("keywords"), Some("New Wave, S'vetom na ti"));
        for field in ZERO_FIELDS {
            assert_eq!(payload.text(field), Some("0"), "{field}");
        }
        assert!(payload.file("torrent-cover").is_some());
    }

    #[test]
    fn test_sp_param_auth_in_form_body() {
        let backend = SpBackend::new(config(), Arc::new(RecordingSender::new()));
        let payload = backend.build_payload(&metadata(), "desc", &torrent(), None).unwrap();
        let request = backend.prepare_request(&payload).unwrap();

        assert_eq!(request.url.as_str(), "https://sp.example/api/torrents/upload");
        assert_eq!(request.body_field("api_token").as_deref(), Some("sp-token-xyz"));
        assert!(request.header("Authorization").is_none());
    }

    #[test]
    fn test_sp_validation_errors() {
        let backend = SpBackend::new(config(), Arc::new(RecordingSender::new()));
        let body = br#"{"message": "The given data was invalid.", "errors": {"category_id": ["The selected category id is invalid."]}}"#;
        let error = backend.parse_error_response(422, body);

        assert_eq!(error.kind, ErrorKind::TrackerRejection);
        assert_eq!(error.message, "The given data was invalid.");
        assert_eq!(error.details[0], "category_id: The selected category id is invalid.");
        assert!(error.details.iter().any(|detail| detail.contains("category_ids")));
    }
}
