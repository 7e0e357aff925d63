//! Tracker backends, their configuration and the HTTP transport

pub mod backends;
pub mod config;
pub mod generic;
pub mod http;
pub mod registry;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_mocks;

pub use backends::{SpBackend, YusBackend};
pub use config::{AuthType, ConfigError, PayloadFormat, TrackerConfig, TrackerConfigSet};
pub use generic::{BackendDefaults, GenericBackend};
pub use http::{HttpResponse, HttpSender, PreparedRequest, RequestBody, ReqwestSender, SendError};
pub use registry::{RegistryError, TrackerFactory, TrackerRegistry, TrackerRegistryBuilder};
pub use types::{
    CoverImage, ErrorKind, PayloadValue, StructuredError, TorrentAttachment, TrackerClient,
    Transport, UploadPayload, UploadResult, UploadStatus,
};
