//! Tracklift Core - Torrent construction and tracker upload dispatch
//!
//! This crate provides the building blocks for publishing local audio releases
//! on private BitTorrent trackers: deterministic torrent creation, a registry of
//! pluggable tracker backends, and an upload coordinator with retry and
//! dry-run support.

pub mod cancel;
pub mod config;
pub mod release;
pub mod torrent;
pub mod tracing_setup;
pub mod tracker;
pub mod upload;

// Re-export main types for convenient access
pub use cancel::CancelSignal;
pub use config::TrackliftConfig;
pub use release::{ReleaseMetadata, Track};
pub use torrent::{BuildError, BuiltTorrent, InfoHash, TorrentBuilder};
pub use tracker::{ConfigError, RegistryError, TrackerClient, TrackerRegistry};
pub use upload::{UploadCoordinator, UploadError, UploadOptions, UploadRequest, UploadResult};

/// Top-level errors that can bubble up from any Tracklift subsystem.
#[derive(Debug, thiserror::Error)]
pub enum TrackliftError {
    #[error("Torrent build error: {0}")]
    Build(#[from] BuildError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrackliftError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            TrackliftError::Build(e) => match e {
                BuildError::EmptyInput { reason } => format!("Nothing to build: {reason}"),
                BuildError::Io { path, .. } => format!("Could not read {}", path.display()),
                BuildError::Cancelled => "Torrent creation was cancelled".to_string(),
                _ => "Torrent creation failed".to_string(),
            },
            TrackliftError::Upload(e) => match e {
                UploadError::Config(config) => format!("Tracker is misconfigured: {config}"),
                UploadError::Auth { .. } => "Tracker rejected the credentials".to_string(),
                UploadError::Rejected(rejection) => {
                    format!("Tracker rejected the upload: {}", rejection.message)
                }
                UploadError::UnsupportedFormat { content_type } => {
                    format!("Cover image type {content_type} is not accepted")
                }
                _ => "Upload failed".to_string(),
            },
            TrackliftError::Config(e) => format!("Configuration error: {e}"),
            TrackliftError::Registry(e) => format!("Unknown tracker: {e}"),
            TrackliftError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input or configuration.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            TrackliftError::Config(_)
                | TrackliftError::Registry(_)
                | TrackliftError::Build(BuildError::EmptyInput { .. })
                | TrackliftError::Build(BuildError::InvalidInput { .. })
                | TrackliftError::Upload(UploadError::Config(_))
                | TrackliftError::Upload(UploadError::UnsupportedFormat { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, TrackliftError>;
