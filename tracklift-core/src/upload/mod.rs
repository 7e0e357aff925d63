//! Upload orchestration: validation, payload building, dispatch and retry

pub mod coordinator;
pub mod retry;

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;

pub use coordinator::{UploadCoordinator, UploadState};
pub use retry::{RetryPolicy, RetryStrategy};

use crate::cancel::CancelSignal;
use crate::release::ReleaseMetadata;
use crate::torrent::{BencodeError, BuildError};
use crate::tracker::http::SendError;
pub use crate::tracker::types::{CoverImage, ErrorKind, StructuredError, UploadResult, UploadStatus};
use crate::tracker::{ConfigError, RegistryError};

/// Errors that end an upload.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Unsupported cover image type: {content_type}")]
    UnsupportedFormat { content_type: String },

    #[error("Invalid torrent: {0}")]
    Torrent(#[from] BencodeError),

    #[error("Failed to write torrent: {0}")]
    Output(#[from] BuildError),

    #[error("HTTP client error: {0}")]
    Http(#[from] SendError),

    #[error("Transport error for {url}: {message}")]
    Transport {
        url: String,
        message: String,
        status: Option<u16>,
    },

    #[error("Authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("Tracker rejected the upload: {0}")]
    Rejected(StructuredError),

    #[error("Upload was cancelled")]
    Cancelled,

    #[error("Upload did not finish within {timeout:?}")]
    DeadlineExceeded { timeout: Duration },
}

impl UploadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            UploadError::Config(_) => ErrorKind::Config,
            UploadError::Registry(_) => ErrorKind::NotFound,
            UploadError::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            UploadError::Torrent(_) | UploadError::Output(_) => ErrorKind::Build,
            // Only raised while constructing the client, never per request.
            UploadError::Http(_) => ErrorKind::Config,
            UploadError::Transport { .. } => ErrorKind::Transport,
            UploadError::Auth { .. } => ErrorKind::Auth,
            UploadError::Rejected(error) => error.kind,
            UploadError::Cancelled => ErrorKind::Cancelled,
            UploadError::DeadlineExceeded { .. } => ErrorKind::Timeout,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Serializable form for [`UploadResult::error`].
    pub fn to_structured(&self) -> StructuredError {
        match self {
            UploadError::Rejected(error) => error.clone(),
            UploadError::Auth { status, message } => {
                StructuredError::new(ErrorKind::Auth, message.clone()).with_status(*status)
            }
            UploadError::Transport {
                status: Some(status),
                ..
            } => StructuredError::new(ErrorKind::Transport, self.to_string()).with_status(*status),
            other => StructuredError::new(other.kind(), other.to_string()),
        }
    }
}

/// One release destined for one tracker.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Configured tracker identifier, case-insensitive
    pub tracker_id: String,
    /// Encoded torrent file
    pub torrent: Bytes,
    pub metadata: ReleaseMetadata,
    /// Rendered release description
    pub description: String,
    pub cover: Option<CoverImage>,
}

/// Per-call switches.
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Build everything but skip the network call
    pub debug: bool,
    pub cancel: CancelSignal,
    /// Upload the torrent as given instead of re-stamping it with the
    /// tracker's announce URL and source tag
    pub keep_announce: bool,
    /// Write the tracker's copy as `<name> [TRACKER].torrent` here before
    /// dispatch
    pub output_dir: Option<PathBuf>,
}

impl UploadOptions {
    pub fn debug() -> Self {
        Self {
            debug: true,
            ..Self::default()
        }
    }
}
