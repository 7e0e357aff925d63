//! Upload payloads, results and the tracker client contract

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

use super::config::{PayloadFormat, TrackerConfig};
use super::http::PreparedRequest;
use crate::release::ReleaseMetadata;
use crate::torrent::{BencodeError, InfoHash, TorrentSummary};
use crate::upload::UploadError;

/// Content type of `.torrent` attachments
pub const TORRENT_CONTENT_TYPE: &str = "application/x-bittorrent";

/// Multipart field carrying the torrent file
pub const TORRENT_FIELD: &str = "torrent";

/// Cover image types trackers accept
const ACCEPTED_COVER_TYPES: &[&str] = &["jpg", "jpeg", "png", "webp"];

/// Channel used to deliver an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Transport {
    /// Authenticated API endpoint
    Api,
    /// Browser-style form post through a cookie-carrying session
    WebForm,
}

/// One payload field value.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadValue {
    Text(String),
    File {
        file_name: String,
        content_type: String,
        bytes: Bytes,
    },
}

impl PayloadValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            Self::File { .. } => None,
        }
    }
}

/// Backend-specific upload payload, prior to transport encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadPayload {
    pub tracker: String,
    pub format: PayloadFormat,
    pub fields: BTreeMap<String, PayloadValue>,
}

impl UploadPayload {
    pub fn new(tracker: impl Into<String>, format: PayloadFormat) -> Self {
        Self {
            tracker: tracker.into(),
            format,
            fields: BTreeMap::new(),
        }
    }

    pub fn set_text(&mut self, name: &str, value: impl Into<String>) {
        self.fields
            .insert(name.to_string(), PayloadValue::Text(value.into()));
    }

    pub fn set_file(&mut self, name: &str, file_name: &str, content_type: &str, bytes: Bytes) {
        self.fields.insert(
            name.to_string(),
            PayloadValue::File {
                file_name: file_name.to_string(),
                content_type: content_type.to_string(),
                bytes,
            },
        );
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(PayloadValue::as_text)
    }

    pub fn file(&self, name: &str) -> Option<(&str, &str, &Bytes)> {
        match self.fields.get(name) {
            Some(PayloadValue::File {
                file_name,
                content_type,
                bytes,
            }) => Some((file_name, content_type, bytes)),
            _ => None,
        }
    }

    /// Field names with file attachments summarized, for logging.
    pub fn describe(&self) -> String {
        self.fields
            .iter()
            .map(|(name, value)| match value {
                PayloadValue::Text(text) => format!("{name}={text:?}"),
                PayloadValue::File {
                    file_name, bytes, ..
                } => format!("{name}=<{file_name}, {} bytes>", bytes.len()),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Cover art supplied by the caller as opaque bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverImage {
    pub bytes: Bytes,
    pub content_type: String,
    pub file_name: String,
}

impl CoverImage {
    /// Validates the content type and builds a cover.
    ///
    /// Accepts `jpg`, `jpeg`, `png` and `webp`, with or without the `image/`
    /// prefix.
    ///
    /// # Errors
    /// - `UploadError::UnsupportedFormat` - Any other content type
    pub fn new(
        bytes: impl Into<Bytes>,
        content_type: &str,
        file_name: impl Into<String>,
    ) -> Result<Self, UploadError> {
        let normalized = content_type.trim().to_lowercase();
        let subtype = normalized.strip_prefix("image/").unwrap_or(&normalized);

        if !ACCEPTED_COVER_TYPES.contains(&subtype) {
            return Err(UploadError::UnsupportedFormat {
                content_type: content_type.to_string(),
            });
        }

        let content_type = match subtype {
            "jpg" | "jpeg" => "image/jpeg".to_string(),
            other => format!("image/{other}"),
        };

        Ok(Self {
            bytes: bytes.into(),
            content_type,
            file_name: file_name.into(),
        })
    }

    /// Re-checks the content type, for covers assembled field by field.
    ///
    /// # Errors
    /// - `UploadError::UnsupportedFormat` - Content type not accepted
    pub fn ensure_supported(&self) -> Result<(), UploadError> {
        Self::new(Bytes::new(), &self.content_type, String::new()).map(|_| ())
    }

    /// Builds a cover, guessing the content type from the file name.
    ///
    /// # Errors
    /// - `UploadError::UnsupportedFormat` - Unknown or unaccepted extension
    pub fn from_file_name(
        bytes: impl Into<Bytes>,
        file_name: impl Into<String>,
    ) -> Result<Self, UploadError> {
        let file_name = file_name.into();
        let guessed = mime_guess::from_path(&file_name)
            .first_raw()
            .unwrap_or("application/octet-stream");
        Self::new(bytes, guessed, file_name)
    }
}

/// Torrent file attached to an upload.
#[derive(Debug, Clone, PartialEq)]
pub struct TorrentAttachment {
    pub file_name: String,
    pub bytes: Bytes,
    pub summary: TorrentSummary,
}

impl TorrentAttachment {
    /// Parses `bytes` to validate them and extract the summary.
    ///
    /// # Errors
    /// - `BencodeError` - The bytes are not a torrent
    pub fn new(bytes: Bytes, file_name: impl Into<String>) -> Result<Self, BencodeError> {
        let summary = TorrentSummary::parse(&bytes)?;
        Ok(Self {
            file_name: file_name.into(),
            bytes,
            summary,
        })
    }
}

/// Classification of upload failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Build,
    UnsupportedFormat,
    Transport,
    Auth,
    TrackerRejection,
    Cancelled,
    Timeout,
    NotFound,
}

impl ErrorKind {
    /// Only transport failures are worth another attempt.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Transport)
    }
}

/// Serializable error view carried by failed results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructuredError {
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
    /// Per-field validation messages, when the tracker supplies them
    pub details: Vec<String>,
}

impl StructuredError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            details: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        for detail in &self.details {
            write!(f, "; {detail}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Success,
    Failure,
}

/// Outcome of one upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadResult {
    pub tracker: String,
    pub status: UploadStatus,
    pub remote_id: Option<String>,
    pub url: Option<String>,
    pub message: Option<String>,
    pub error: Option<StructuredError>,
    /// True when produced in debug mode without a network call
    pub simulated: bool,
    pub attempts: u32,
    /// Infohash of the torrent as this tracker received it. Differs from the
    /// input torrent's whenever the announce URL or source was re-stamped.
    pub info_hash: Option<InfoHash>,
    /// The tracker's copy of the torrent, the one to seed
    #[serde(skip)]
    pub torrent: Option<Bytes>,
    /// Where the tracker's copy was written, when an output directory was set
    pub torrent_path: Option<PathBuf>,
}

impl UploadResult {
    pub fn success(tracker: impl Into<String>) -> Self {
        Self {
            tracker: tracker.into(),
            status: UploadStatus::Success,
            remote_id: None,
            url: None,
            message: None,
            error: None,
            simulated: false,
            attempts: 0,
            info_hash: None,
            torrent: None,
            torrent_path: None,
        }
    }

    pub fn failure(tracker: impl Into<String>, error: StructuredError, attempts: u32) -> Self {
        Self {
            tracker: tracker.into(),
            status: UploadStatus::Failure,
            remote_id: None,
            url: None,
            message: Some(error.message.clone()),
            error: Some(error),
            simulated: false,
            attempts,
            info_hash: None,
            torrent: None,
            torrent_path: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == UploadStatus::Success
    }
}

/// Capability set every tracker backend provides.
///
/// [`GenericBackend`](super::generic::GenericBackend) implements all of it;
/// concrete backends wrap it and override what differs.
#[async_trait]
pub trait TrackerClient: Send + Sync {
    /// Configured tracker identifier, e.g. `YUS`.
    fn tracker_id(&self) -> &str;

    /// Registry name of the backend implementation.
    fn backend_name(&self) -> &'static str;

    fn config(&self) -> &TrackerConfig;

    /// Transport chosen from `use_api` and the upload URL.
    fn transport(&self) -> Transport;

    /// Required settings that are absent for the selected transport.
    fn missing_fields(&self) -> Vec<&'static str>;

    /// True when every field the selected transport needs is present.
    fn is_configured(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Maps release data into this tracker's fields.
    ///
    /// # Errors
    /// - `UploadError::Config` - Category or format has no configured ID
    fn build_payload(
        &self,
        metadata: &ReleaseMetadata,
        description: &str,
        torrent: &TorrentAttachment,
        cover: Option<&CoverImage>,
    ) -> Result<UploadPayload, UploadError>;

    /// Encodes a payload into a request with credentials attached.
    ///
    /// # Errors
    /// - `UploadError::Config` - Upload URL cannot be resolved
    fn prepare_request(&self, payload: &UploadPayload) -> Result<PreparedRequest, UploadError>;

    /// Sends one upload attempt and interprets the response.
    ///
    /// # Errors
    /// - `UploadError::Transport` - Timeout, connection failure or 5xx
    /// - `UploadError::Auth` - 401 or 403
    /// - `UploadError::Rejected` - Any other refusal
    async fn upload(&self, payload: &UploadPayload) -> Result<UploadResult, UploadError>;

    /// Extracts a readable error from a failed response body.
    fn parse_error_response(&self, status: u16, body: &[u8]) -> StructuredError;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cover_content_types() {
        for accepted in ["image/jpeg", "jpg", "JPEG", "image/png", "webp", " image/webp "] {
            assert!(CoverImage::new(vec![1u8], accepted, "cover").is_ok(), "{accepted}");
        }
        for rejected in ["image/gif", "gif", "image/bmp", "text/plain", ""] {
            assert!(
                matches!(
                    CoverImage::new(vec![1u8], rejected, "cover"),
                    Err(UploadError::UnsupportedFormat { .. })
                ),
                "{rejected}"
            );
        }
    }

    #[test]
    fn test_cover_normalizes_content_type() {
        let cover = CoverImage::new(vec![1u8], "jpg", "folder.jpg").unwrap();
        assert_eq!(cover.content_type, "image/jpeg");
    }

    #[test]
    fn test_cover_from_file_name() {
        let cover = CoverImage::from_file_name(vec![1u8], "Front.PNG").unwrap();
        assert_eq!(cover.content_type, "image/png");
        assert!(CoverImage::from_file_name(vec![1u8], "anim.gif").is_err());
        assert!(CoverImage::from_file_name(vec![1u8], "noext").is_err());
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::Transport.is_retryable());
        for kind in [
            ErrorKind::Auth,
            ErrorKind::TrackerRejection,
            ErrorKind::Config,
            ErrorKind::UnsupportedFormat,
            ErrorKind::Timeout,
        ] {
            assert!(!kind.is_retryable());
        }
    }

    #[test]
    fn test_payload_accessors() {
        let mut payload = UploadPayload::new("YUS", PayloadFormat::Form);
        payload.set_text("title", "Album");
        payload.set_file("torrent", "a.torrent", TORRENT_CONTENT_TYPE, Bytes::from_static(b"d"));

        assert_eq!(payload.text("title"), Some("Album"));
        assert_eq!(payload.text("torrent"), None);
        assert_eq!(payload.file("torrent").map(|(name, _, _)| name), Some("a.torrent"));
        assert!(payload.describe().contains("torrent=<a.torrent, 1 bytes>"));
    }
}
