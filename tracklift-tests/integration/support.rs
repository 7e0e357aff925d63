//! Shared fixtures for the integration tests

use std::sync::Arc;

use bytes::Bytes;
use tracklift_core::config::TrackliftConfig;
use tracklift_core::release::ReleaseMetadata;
use tracklift_core::torrent::{BuildOptions, FileEntry, TorrentBuilder};
use tracklift_core::tracker::test_mocks::RecordingSender;
use tracklift_core::tracker::{TrackerConfigSet, TrackerRegistry};
use tracklift_core::{UploadCoordinator, UploadRequest};

pub const ANNOUNCE: &str = "https://tracker.example/announce";

pub const TRACKERS_JSON: &str = r#"{
    "trackers": {
        "yus": {
            "backend": "yus",
            "api_key": "yuskey-0001",
            "base_url": "https://yus.example",
            "upload_url": "/api/torrents/upload",
            "announce_url": "https://yus.example/announce/passkey",
            "source": "YUS",
            "category_ids": { "album": 1, "EP": "2" },
            "format_ids": { "flac": 5, "MP3": 6 }
        },
        "SP": {
            "api_key": "spkey-0002",
            "url": "https://sp.example",
            "upload_url": "https://sp.example/api/torrents/upload",
            "announce_url": "https://sp.example/announce/passkey",
            "category_ids": { "ALBUM": 3 },
            "format_ids": { "FLAC": 9 }
        },
        "HEAD": {
            "backend": "generic",
            "api_key": "headkey-0003",
            "upload_url": "https://head.example/api/upload",
            "auth_type": "token",
            "token_header": "X-Head-Key",
            "payload_format": "json",
            "category_ids": { "ALBUM": 11 },
            "format_ids": { "FLAC": 12 }
        },
        "FORM": {
            "backend": "generic",
            "username": "uploader",
            "password": "hunter22",
            "upload_url": "https://form.example/upload.php",
            "category_ids": { "ALBUM": 1 },
            "format_ids": { "FLAC": 1 }
        },
        "OFF": {
            "enabled": false,
            "api_key": "offkey",
            "upload_url": "https://off.example/api/upload"
        }
    }
}"#;

pub fn trackers() -> TrackerConfigSet {
    TrackerConfigSet::from_json_str(TRACKERS_JSON).unwrap()
}

pub fn coordinator(sender: Arc<RecordingSender>) -> UploadCoordinator {
    coordinator_with(sender, TrackliftConfig::for_testing())
}

pub fn coordinator_with(sender: Arc<RecordingSender>, config: TrackliftConfig) -> UploadCoordinator {
    UploadCoordinator::new(
        Arc::new(TrackerRegistry::with_builtin_backends()),
        Arc::new(trackers()),
        sender,
        config.upload,
    )
}

pub fn metadata() -> ReleaseMetadata {
    ReleaseMetadata {
        artist: "The Artist".to_string(),
        album: "Long Player".to_string(),
        year: Some(2004),
        format: "FLAC".to_string(),
        media: Some("CD".to_string()),
        genres: vec!["Rock".to_string()],
        ..Default::default()
    }
}

/// Three in-memory tracks with distinct content.
pub fn release_files() -> Vec<FileEntry> {
    (1..=3u8)
        .map(|track| {
            let data: Vec<u8> = (0..70_000u32)
                .map(|i| (i % 251) as u8 ^ track.wrapping_mul(37))
                .collect();
            FileEntry::from_bytes(vec![format!("{track:02} - Song.flac")], data)
        })
        .collect()
}

pub async fn built_torrent() -> Bytes {
    let options = BuildOptions {
        name: Some("The Artist - Long Player (2004) FLAC".to_string()),
        announce: vec![ANNOUNCE.to_string()],
        private: true,
        ..BuildOptions::default()
    };
    TorrentBuilder::build(release_files(), options).await.unwrap().bytes
}

pub async fn request(tracker: &str) -> UploadRequest {
    UploadRequest {
        tracker_id: tracker.to_string(),
        torrent: built_torrent().await,
        metadata: metadata(),
        description: "Ripped with EAC, log included.".to_string(),
        cover: None,
    }
}
