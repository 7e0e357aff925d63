//! YU-Scene backend
//!
//! Bearer-authenticated form uploads. The site names its fields `title`,
//! `cat`, `format` and `media`, and expects the cover under `cover`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::release::ReleaseMetadata;
use crate::tracker::config::{AuthType, PayloadFormat, TrackerConfig};
use crate::tracker::generic::{BackendDefaults, GenericBackend};
use crate::tracker::http::{HttpSender, PreparedRequest};
use crate::tracker::types::{
    CoverImage, StructuredError, TorrentAttachment, TrackerClient, Transport, UploadPayload,
    UploadResult,
};
use crate::upload::UploadError;

pub const YUS_DEFAULTS: BackendDefaults = BackendDefaults {
    name: "yus",
    auth_type: AuthType::Bearer,
    payload_format: PayloadFormat::Form,
    cover_field: "cover",
};

pub struct YusBackend {
    inner: GenericBackend,
}

impl YusBackend {
    pub fn new(config: TrackerConfig, sender: Arc<dyn HttpSender>) -> Self {
        Self {
            inner: GenericBackend::new(config, sender, YUS_DEFAULTS),
        }
    }

    pub fn create(config: TrackerConfig, sender: Arc<dyn HttpSender>) -> Arc<dyn TrackerClient> {
        Arc::new(Self::new(config, sender))
    }
}

#[async_trait]
impl TrackerClient for YusBackend {
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
        let title = match metadata.album.trim() {
            "" => metadata.upload_name(),
            album => album.to_string(),
        };

        let mut payload = self.inner.new_payload();
        payload.set_text("title", title);
        payload.set_text("description", description);
        payload.set_text("cat", self.inner.category_id(metadata)?);
        payload.set_text("format", self.inner.format_id(metadata)?);
        if let Some(media) = metadata.media.as_deref().filter(|media| !media.is_empty()) {
            payload.set_text("media", media);
        }
        payload.set_text("anonymous", self.inner.anonymous_flag());
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
        self.inner.parse_error_response(status, body)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::tracker::test_mocks::RecordingSender;

    fn config() -> TrackerConfig {
        let mut config = TrackerConfig::new("YUS");
        config.api_key = "yus-key-0001".to_string();
        config.upload_url = Some("https://yu-scene.net/api/torrents/upload".to_string());
        config.category_ids.insert("ALBUM".to_string(), "7".to_string());
        config.category_ids.insert("EP".to_string(), "9".to_string());
        config.format_ids.insert("FLAC".to_string(), "1".to_string());
        config.anonymous = true;
        config
    }

    fn torrent() -> TorrentAttachment {
        TorrentAttachment::new(
            Bytes::from_static(b"d4:infod6:lengthi1e4:name1:x12:piece lengthi16384e6:pieces20:bbbbbbbbbbbbbbbbbbbbee"),
            "x.torrent",
        )
        .unwrap()
    }

    #[test]
    fn test_yus_field_names() {
        let backend = YusBackend::new(config(), Arc::new(RecordingSender::new()));
        let metadata = ReleaseMetadata {
            artist: "Bajaga".to_string(),
            album: "Sa druge strane jastuka".to_string(),
            format: "flac".to_string(),
            release_type: Some("ep".to_string()),
            media: Some("CD".to_string()),
            ..Default::default()
        };
        let cover = CoverImage::new(vec![0xff, 0xd8], "image/jpeg", "folder.jpg").unwrap();

        let payload = backend
            .build_payload(&metadata, "desc", &torrent(), Some(&cover))
            .unwrap();

        assert_eq!(payload.text("title"), Some("Sa druge strane jastuka"));
        assert_eq!(payload.text("cat"), Some("9"));
        assert_eq!(payload.text("format"), Some("1"));
        assert_eq!(payload.text("media"), Some("CD"));
        assert_eq!(payload.text("anonymous"), Some("1"));
        assert!(payload.file("cover").is_some());
        assert!(payload.text("name").is_none());
    }

    #[test]
    fn test_yus_uses_bearer_header() {
        let backend = YusBackend::new(config(), Arc::new(RecordingSender::new()));
        let metadata = ReleaseMetadata {
            album: "A".to_string(),
            format: "FLAC".to_string(),
            ..Default::default()
        };
        let payload = backend.build_payload(&metadata, "d", &torrent(), None).unwrap();
        let request = backend.prepare_request(&payload).unwrap();

        assert_eq!(backend.backend_name(), "yus");
        assert_eq!(request.header("Authorization"), Some("Bearer yus-key-0001"));
        assert!(request.query_param("api_token").is_none());
    }
}
