//! Upload coordinator
//!
//! Drives a single upload through validation, payload construction and
//! dispatch. Every phase change is logged so a failed upload can be traced
//! from the run log alone. The coordinator holds no per-upload state, so one
//! instance can serve concurrent uploads.

use std::fmt;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::Instrument;

use super::{UploadError, UploadOptions, UploadRequest};
use crate::cancel::CancelSignal;
use crate::config::{TrackliftConfig, UploadConfig};
use crate::torrent::{retarget, sanitize_filename, write_torrent};
use crate::tracing_setup::{next_upload_id, upload_span};
use crate::tracker::types::{TorrentAttachment, TrackerClient, UploadPayload, UploadResult};
use crate::tracker::{ConfigError, HttpSender, ReqwestSender, TrackerConfigSet, TrackerRegistry};

/// Phases of one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    Validating,
    BuildingPayload,
    Dispatching { attempt: u32 },
    Retrying { attempt: u32 },
    Simulated,
    Succeeded,
    Failed,
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadState::Idle => write!(f, "idle"),
            UploadState::Validating => write!(f, "validating"),
            UploadState::BuildingPayload => write!(f, "building payload"),
            UploadState::Dispatching { attempt } => write!(f, "dispatching (attempt {attempt})"),
            UploadState::Retrying { attempt } => write!(f, "retrying after attempt {attempt}"),
            UploadState::Simulated => write!(f, "simulated"),
            UploadState::Succeeded => write!(f, "succeeded"),
            UploadState::Failed => write!(f, "failed"),
        }
    }
}

/// Logged state transitions for one upload.
struct Progress {
    tracker: String,
    state: UploadState,
    attempts: u32,
}

impl Progress {
    fn new(tracker: &str) -> Self {
        Self {
            tracker: tracker.to_string(),
            state: UploadState::Idle,
            attempts: 0,
        }
    }

    fn advance(&mut self, next: UploadState) {
        tracing::info!("[{}] {} -> {}", self.tracker, self.state, next);
        if let UploadState::Dispatching { attempt } = next {
            self.attempts = attempt;
        }
        self.state = next;
    }
}

/// Validates, builds and dispatches uploads to configured trackers.
pub struct UploadCoordinator {
    registry: Arc<TrackerRegistry>,
    trackers: Arc<TrackerConfigSet>,
    sender: Arc<dyn HttpSender>,
    config: UploadConfig,
}

impl UploadCoordinator {
    pub fn new(
        registry: Arc<TrackerRegistry>,
        trackers: Arc<TrackerConfigSet>,
        sender: Arc<dyn HttpSender>,
        config: UploadConfig,
    ) -> Self {
        Self {
            registry,
            trackers,
            sender,
            config,
        }
    }

    /// Coordinator over the built-in backends using a real HTTP client.
    ///
    /// # Errors
    /// - `UploadError::Http` - The HTTP client could not be constructed
    pub fn with_defaults(
        config: &TrackliftConfig,
        trackers: TrackerConfigSet,
    ) -> Result<Self, UploadError> {
        let sender = ReqwestSender::new(&config.upload)?;
        Ok(Self::new(
            Arc::new(TrackerRegistry::with_builtin_backends()),
            Arc::new(trackers),
            Arc::new(sender),
            config.upload.clone(),
        ))
    }

    pub fn trackers(&self) -> &TrackerConfigSet {
        &self.trackers
    }

    /// Checks that `tracker_id` is known, enabled and fully configured,
    /// returning the backend that would serve it.
    ///
    /// # Errors
    /// - `ConfigError::UnknownTracker` / `ConfigError::Disabled`
    /// - `ConfigError::NotConfigured` - Required fields missing
    /// - `UploadError::Registry` - No backend for the configured key
    pub fn validate(&self, tracker_id: &str) -> Result<Arc<dyn TrackerClient>, UploadError> {
        let config = self.trackers.get(tracker_id)?;
        if !config.enabled {
            return Err(ConfigError::Disabled {
                tracker: config.id.clone(),
            }
            .into());
        }

        let client = self.registry.instantiate(config, Arc::clone(&self.sender))?;
        let missing = client.missing_fields();
        if !missing.is_empty() {
            return Err(ConfigError::NotConfigured {
                tracker: config.id.clone(),
                missing,
            }
            .into());
        }
        Ok(client)
    }

    /// Uploads one release, folding any failure into the returned result.
    pub async fn upload(&self, request: UploadRequest, options: UploadOptions) -> UploadResult {
        let tracker = self
            .trackers
            .get(&request.tracker_id)
            .map(|config| config.id.clone())
            .unwrap_or_else(|_| request.tracker_id.clone());

        let span = upload_span(&tracker, next_upload_id());
        let mut progress = Progress::new(&tracker);
        match self
            .run(request, &options, &mut progress)
            .instrument(span)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("[{}] Upload failed: {}", tracker, e);
                UploadResult::failure(tracker, e.to_structured(), progress.attempts)
            }
        }
    }

    /// Uploads one release, returning failures as errors.
    ///
    /// # Errors
    /// - `UploadError::Config` - Tracker unknown, disabled or incomplete
    /// - `UploadError::UnsupportedFormat` - Cover image type not accepted
    /// - `UploadError::Transport` - Retries exhausted
    /// - `UploadError::Auth` / `UploadError::Rejected` - Tracker refused
    /// - `UploadError::Cancelled` / `UploadError::DeadlineExceeded`
    pub async fn try_upload(
        &self,
        request: UploadRequest,
        options: UploadOptions,
    ) -> Result<UploadResult, UploadError> {
        let span = upload_span(&request.tracker_id, next_upload_id());
        let mut progress = Progress::new(&request.tracker_id);
        self.run(request, &options, &mut progress)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        request: UploadRequest,
        options: &UploadOptions,
        progress: &mut Progress,
    ) -> Result<UploadResult, UploadError> {
        progress.advance(UploadState::Validating);
        let client = match self.validate(&request.tracker_id) {
            Ok(client) => client,
            Err(e) => {
                progress.advance(UploadState::Failed);
                return Err(e);
            }
        };

        progress.advance(UploadState::BuildingPayload);
        let (payload, attachment) = match self.build_payload(client.as_ref(), &request, options) {
            Ok(built) => built,
            Err(e) => {
                progress.advance(UploadState::Failed);
                return Err(e);
            }
        };

        let torrent_path = match &options.output_dir {
            Some(dir) => {
                let name = request.metadata.upload_name();
                match write_torrent(dir, &name, Some(client.tracker_id()), &attachment.bytes).await {
                    Ok(path) => Some(path),
                    Err(e) => {
                        progress.advance(UploadState::Failed);
                        return Err(e.into());
                    }
                }
            }
            None => None,
        };

        let mut result = if options.debug || self.config.debug {
            self.simulate(client.as_ref(), &payload, progress)?
        } else {
            self.dispatch(client.as_ref(), &payload, &options.cancel, progress)
                .await?
        };

        result.info_hash = Some(attachment.summary.info_hash);
        result.torrent = Some(attachment.bytes);
        result.torrent_path = torrent_path;
        Ok(result)
    }

    fn build_payload(
        &self,
        client: &dyn TrackerClient,
        request: &UploadRequest,
        options: &UploadOptions,
    ) -> Result<(UploadPayload, TorrentAttachment), UploadError> {
        let config = client.config();
        let torrent = match config.announce_url.as_deref() {
            Some(announce) if !options.keep_announce => {
                let (bytes, summary) = retarget(&request.torrent, announce, config.source.as_deref())?;
                tracing::debug!(
                    "[{}] Torrent retargeted, infohash {}",
                    config.id,
                    summary.info_hash
                );
                bytes
            }
            _ => request.torrent.clone(),
        };

        let file_name = format!("{}.torrent", sanitize_filename(&request.metadata.upload_name()));
        let attachment = TorrentAttachment::new(torrent, file_name)?;

        let payload = client.build_payload(
            &request.metadata,
            &request.description,
            &attachment,
            request.cover.as_ref(),
        )?;
        Ok((payload, attachment))
    }

    /// Builds and logs the request that would be sent, without sending it.
    fn simulate(
        &self,
        client: &dyn TrackerClient,
        payload: &UploadPayload,
        progress: &mut Progress,
    ) -> Result<UploadResult, UploadError> {
        let request = match client.prepare_request(payload) {
            Ok(request) => request,
            Err(e) => {
                progress.advance(UploadState::Failed);
                return Err(e);
            }
        };

        tracing::info!(
            "[{}] Debug mode, request not sent: {}",
            progress.tracker,
            request.redacted(&[client.config().api_key.as_str(), client.config().password.as_str()])
        );
        tracing::debug!("[{}] Debug payload: {}", progress.tracker, payload.describe());

        progress.advance(UploadState::Simulated);
        let mut result = UploadResult::success(client.tracker_id());
        result.simulated = true;
        result.message = Some(format!(
            "Debug mode: {} upload simulation successful",
            client.tracker_id()
        ));
        Ok(result)
    }

    /// Sends with retries. Cancellation and the overall deadline are only
    /// checked between attempts; a request already on the wire runs to
    /// completion, bounded by the per-request timeout.
    async fn dispatch(
        &self,
        client: &dyn TrackerClient,
        payload: &UploadPayload,
        cancel: &CancelSignal,
        progress: &mut Progress,
    ) -> Result<UploadResult, UploadError> {
        let policy = &self.config.retry;
        let timeout = self.config.overall_timeout;
        let deadline = Instant::now() + timeout;
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                tracing::info!("[{}] Upload cancelled before attempt {}", progress.tracker, attempt + 1);
                progress.advance(UploadState::Failed);
                return Err(UploadError::Cancelled);
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    "[{}] Overall timeout of {:?} reached before attempt {}",
                    progress.tracker,
                    timeout,
                    attempt + 1
                );
                progress.advance(UploadState::Failed);
                return Err(UploadError::DeadlineExceeded { timeout });
            }

            attempt += 1;
            progress.advance(UploadState::Dispatching { attempt });

            match client.upload(payload).await {
                Ok(mut result) => {
                    result.attempts = attempt;
                    progress.advance(UploadState::Succeeded);
                    return Ok(result);
                }
                Err(e) if e.is_retryable() && policy.should_retry(attempt) => {
                    let delay = policy.delay_after(attempt);
                    if Instant::now() + delay >= deadline {
                        tracing::warn!(
                            "[{}] Attempt {} failed: {}. Retry in {:?} would pass the overall timeout of {:?}",
                            progress.tracker,
                            attempt,
                            e,
                            delay,
                            timeout
                        );
                        progress.advance(UploadState::Failed);
                        return Err(UploadError::DeadlineExceeded { timeout });
                    }

                    tracing::warn!(
                        "[{}] Attempt {} failed: {}. Retrying in {:?}",
                        progress.tracker,
                        attempt,
                        e,
                        delay
                    );
                    progress.advance(UploadState::Retrying { attempt });
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    progress.advance(UploadState::Failed);
                    return Err(e);
                }
            }
        }
    }
}
