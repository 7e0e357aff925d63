//! Centralized configuration for Tracklift.
//!
//! Tunable parameters for torrent building and upload dispatch live here.
//! Per-tracker settings are loaded separately, see [`crate::tracker::config`].

use std::time::Duration;

use crate::torrent::PieceLengthPolicy;
use crate::upload::retry::RetryPolicy;

/// Central configuration for all Tracklift components.
///
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct TrackliftConfig {
    pub torrent: TorrentConfig,
    pub upload: UploadConfig,
}

/// Torrent building defaults.
#[derive(Debug, Clone)]
pub struct TorrentConfig {
    pub piece_length: PieceLengthPolicy,
    /// Hashing worker count
    pub hash_workers: usize,
    /// Value for the `created by` field
    pub created_by: Option<String>,
    pub comment: Option<String>,
    pub private: bool,
}

impl Default for TorrentConfig {
    fn default() -> Self {
        Self {
            piece_length: PieceLengthPolicy::default(),
            hash_workers: num_cpus::get(),
            created_by: Some(format!("tracklift/{}", env!("CARGO_PKG_VERSION"))),
            comment: None,
            private: true,
        }
    }
}

/// Upload dispatch configuration.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Timeout for a single HTTP request
    pub request_timeout: Duration,
    /// Bound on the whole dispatch phase, retries included
    pub overall_timeout: Duration,
    pub retry: RetryPolicy,
    /// User agent for HTTP requests
    pub user_agent: &'static str,
    /// Build payloads without sending them
    pub debug: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            overall_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
            user_agent: concat!("tracklift/", env!("CARGO_PKG_VERSION")),
            debug: false,
        }
    }
}

impl TrackliftConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Unparseable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(timeout) = std::env::var("TRACKLIFT_UPLOAD_TIMEOUT")
            && let Ok(seconds) = timeout.parse::<u64>()
        {
            config.upload.overall_timeout = Duration::from_secs(seconds);
        }

        if let Ok(attempts) = std::env::var("TRACKLIFT_MAX_ATTEMPTS")
            && let Ok(count) = attempts.parse::<u32>()
        {
            config.upload.retry.max_attempts = count.max(1);
        }

        if let Ok(workers) = std::env::var("TRACKLIFT_HASH_WORKERS")
            && let Ok(count) = workers.parse::<usize>()
        {
            config.torrent.hash_workers = count.max(1);
        }

        if let Ok(debug) = std::env::var("TRACKLIFT_DEBUG") {
            config.upload.debug = matches!(debug.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        config
    }

    /// Creates a configuration for tests: short timeouts and no backoff.
    pub fn for_testing() -> Self {
        Self {
            torrent: TorrentConfig {
                hash_workers: 2,
                created_by: None,
                ..TorrentConfig::default()
            },
            upload: UploadConfig {
                request_timeout: Duration::from_secs(2),
                overall_timeout: Duration::from_secs(5),
                retry: RetryPolicy::immediate(3),
                user_agent: "tracklift/test",
                debug: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = TrackliftConfig::default();

        assert_eq!(config.upload.request_timeout, Duration::from_secs(30));
        assert_eq!(config.upload.overall_timeout, Duration::from_secs(120));
        assert_eq!(config.upload.retry.max_attempts, 3);
        assert!(!config.upload.debug);
        assert!(config.torrent.private);
        assert!(config.torrent.hash_workers >= 1);
        assert_eq!(config.torrent.piece_length, PieceLengthPolicy::default());
    }

    #[test]
    fn test_testing_preset() {
        let config = TrackliftConfig::for_testing();
        assert_eq!(config.torrent.hash_workers, 2);
        assert_eq!(config.upload.retry, RetryPolicy::immediate(3));
        assert!(config.upload.overall_timeout < Duration::from_secs(10));
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("TRACKLIFT_UPLOAD_TIMEOUT", "60");
            std::env::set_var("TRACKLIFT_MAX_ATTEMPTS", "5");
            std::env::set_var("TRACKLIFT_HASH_WORKERS", "0");
            std::env::set_var("TRACKLIFT_DEBUG", "true");
        }

        let config = TrackliftConfig::from_env();

        assert_eq!(config.upload.overall_timeout, Duration::from_secs(60));
        assert_eq!(config.upload.retry.max_attempts, 5);
        assert_eq!(config.torrent.hash_workers, 1);
        assert!(config.upload.debug);

        // Cleanup
        unsafe {
            std::env::remove_var("TRACKLIFT_UPLOAD_TIMEOUT");
            std::env::remove_var("TRACKLIFT_MAX_ATTEMPTS");
            std::env::remove_var("TRACKLIFT_HASH_WORKERS");
            std::env::remove_var("TRACKLIFT_DEBUG");
        }
    }
}
