//! Upload dispatch through the coordinator with a recording sender

use std::sync::Arc;

use bytes::Bytes;
use tracklift_core::config::TrackliftConfig;
use tracklift_core::torrent::TorrentSummary;
use tracklift_core::tracker::test_mocks::RecordingSender;
use tracklift_core::tracker::{
    ConfigError, CoverImage, ErrorKind, PayloadValue, RequestBody, SendError, TrackerConfigSet,
    TrackerRegistry,
};
use tracklift_core::{UploadCoordinator, UploadError, UploadOptions};

use super::support::{coordinator, coordinator_with, request};

#[tokio::test]
async fn test_upload_reports_remote_identifier() {
    let sender = Arc::new(RecordingSender::new());
    sender.push_json(
        200,
        r#"{"success": true, "message": "Uploaded", "data": {"id": 981, "url": "https://yus.example/torrents/981"}}"#,
    );
    let coordinator = coordinator(Arc::clone(&sender));

    let result = coordinator.upload(request("yus").await, UploadOptions::default()).await;

    assert!(result.is_success(), "{result:?}");
    assert_eq!(result.remote_id.as_deref(), Some("981"));
    assert_eq!(result.url.as_deref(), Some("https://yus.example/torrents/981"));
    assert_eq!(result.message.as_deref(), Some("Uploaded"));
    assert_eq!(result.attempts, 1);
}

#[tokio::test]
async fn test_uploaded_torrent_carries_tracker_announce() {
    let sender = Arc::new(RecordingSender::new());
    let coordinator = coordinator(Arc::clone(&sender));

    coordinator
        .try_upload(request("SP").await, UploadOptions::default())
        .await
        .unwrap();

    let sent = sender.last_request().unwrap();
    let RequestBody::Multipart(parts) = sent.body else {
        panic!("expected multipart body");
    };
    let (file_name, bytes) = parts
        .into_iter()
        .find_map(|(name, value)| match value {
            PayloadValue::File {
                file_name, bytes, ..
            } if name == "torrent" => Some((file_name, bytes)),
            _ => None,
        })
        .unwrap();

    assert_eq!(file_name, "The Artist - Long Player (2004) FLAC.torrent");
    let summary = TorrentSummary::parse(&bytes).unwrap();
    assert_eq!(summary.announce.as_deref(), Some("https://sp.example/announce/passkey"));
    assert_eq!(summary.source, None);
    assert!(summary.private);
}

#[tokio::test]
async fn test_debug_mode_never_touches_the_network() {
    let sender = Arc::new(RecordingSender::new());
    sender.push_json(401, r#"{"message": "would fail"}"#);
    let coordinator = coordinator(Arc::clone(&sender));

    for tracker in ["YUS", "SP", "HEAD", "FORM"] {
        let result = coordinator
            .upload(request(tracker).await, UploadOptions::debug())
            .await;
        assert!(result.is_success(), "{tracker}: {result:?}");
        assert!(result.simulated);
        assert_eq!(result.attempts, 0);
    }
    assert_eq!(sender.call_count(), 0);
}

#[tokio::test]
async fn test_missing_api_key_is_config_error_before_transport() {
    let json = r#"{"trackers": {"YUS": {
        "upload_url": "https://yus.example/api/torrents/upload",
        "category_ids": {"ALBUM": 1},
        "format_ids": {"FLAC": 5}
    }}}"#;
    let sender = Arc::new(RecordingSender::new());
    let coordinator = UploadCoordinator::new(
        Arc::new(TrackerRegistry::with_builtin_backends()),
        Arc::new(TrackerConfigSet::from_json_str(json).unwrap()),
        Arc::clone(&sender) as _,
        TrackliftConfig::for_testing().upload,
    );

    let err = coordinator
        .try_upload(request("YUS").await, UploadOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        UploadError::Config(ConfigError::NotConfigured { .. })
    ));
    assert_eq!(sender.call_count(), 0);
}

#[tokio::test]
async fn test_disabled_tracker_is_rejected() {
    let sender = Arc::new(RecordingSender::new());
    let coordinator = coordinator(Arc::clone(&sender));

    let result = coordinator.upload(request("off").await, UploadOptions::default()).await;
    assert!(!result.is_success());
    assert_eq!(result.error.unwrap().kind, ErrorKind::Config);
    assert_eq!(sender.call_count(), 0);
}

#[tokio::test]
async fn test_unmapped_category_fails_payload_build() {
    let sender = Arc::new(RecordingSender::new());
    let coordinator = coordinator(Arc::clone(&sender));
    let mut request = request("SP").await;
    request.metadata.release_type = Some("Compilation".to_string());

    let err = coordinator
        .try_upload(request, UploadOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        UploadError::Config(ConfigError::UnmappedValue { ref key, .. }) if key == "COMPILATION"
    ));
    assert_eq!(sender.call_count(), 0);
}

#[tokio::test]
async fn test_gif_cover_is_unsupported() {
    assert!(matches!(
        CoverImage::new(Bytes::from_static(b"GIF89a"), "image/gif", "cover.gif"),
        Err(UploadError::UnsupportedFormat { .. })
    ));

    let sender = Arc::new(RecordingSender::new());
    let coordinator = coordinator(Arc::clone(&sender));
    let mut request = request("YUS").await;
    request.cover = Some(CoverImage {
        bytes: Bytes::from_static(b"GIF89a"),
        content_type: "image/gif".to_string(),
        file_name: "cover.gif".to_string(),
    });

    let result = coordinator.upload(request, UploadOptions::default()).await;
    assert_eq!(result.error.unwrap().kind, ErrorKind::UnsupportedFormat);
    assert_eq!(sender.call_count(), 0);
}

#[tokio::test]
async fn test_cover_sent_under_backend_field() {
    let sender = Arc::new(RecordingSender::new());
    let coordinator = coordinator(Arc::clone(&sender));
    let mut request = request("YUS").await;
    request.cover = Some(CoverImage::from_file_name(vec![0xffu8, 0xd8, 0xff], "folder.jpg").unwrap());

    coordinator
        .try_upload(request, UploadOptions::default())
        .await
        .unwrap();

    let RequestBody::Multipart(parts) = sender.last_request().unwrap().body else {
        panic!("expected multipart body");
    };
    assert!(parts.iter().any(|(name, value)| {
        name == "cover"
            && matches!(value, PayloadValue::File { content_type, .. } if content_type == "image/jpeg")
    }));
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let sender = Arc::new(RecordingSender::new());
    sender.push_text(503, "<html>maintenance</html>");
    sender.push_error(SendError::Connect {
        url: "https://yus.example/api/torrents/upload".to_string(),
        reason: "connection reset".to_string(),
    });
    sender.push_json(200, r#"{"success": true, "data": 5}"#);
    let coordinator = coordinator(Arc::clone(&sender));

    let result = coordinator.upload(request("YUS").await, UploadOptions::default()).await;

    assert!(result.is_success(), "{result:?}");
    assert_eq!(result.attempts, 3);
    assert_eq!(result.remote_id.as_deref(), Some("5"));
    assert_eq!(sender.call_count(), 3);
}

#[tokio::test]
async fn test_auth_and_validation_failures_are_not_retried() {
    let sender = Arc::new(RecordingSender::new());
    sender.push_json(403, r#"{"error": "Invalid API token"}"#);
    let coordinator = coordinator(Arc::clone(&sender));

    let err = coordinator
        .try_upload(request("YUS").await, UploadOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Auth { status: 403, ref message } if message == "Invalid API token"));
    assert_eq!(sender.call_count(), 1);

    let sender = Arc::new(RecordingSender::new());
    sender.push_json(
        422,
        r#"{"message": "The given data was invalid.", "errors": {"category_id": ["The selected category id is invalid."]}}"#,
    );
    let coordinator = self::coordinator(Arc::clone(&sender));

    let result = coordinator.upload(request("SP").await, UploadOptions::default()).await;
    let error = result.error.unwrap();
    assert_eq!(error.kind, ErrorKind::TrackerRejection);
    assert_eq!(error.status, Some(422));
    assert!(error.details.iter().any(|detail| detail.contains("category_ids")));
    assert_eq!(result.attempts, 1);
    assert_eq!(sender.call_count(), 1);
}

#[tokio::test]
async fn test_success_false_is_rejection() {
    let sender = Arc::new(RecordingSender::new());
    sender.push_json(200, r#"{"success": false, "message": "Dupe of torrent 12"}"#);
    let coordinator = coordinator(Arc::clone(&sender));

    let result = coordinator.upload(request("YUS").await, UploadOptions::default()).await;
    let error = result.error.unwrap();
    assert_eq!(error.kind, ErrorKind::TrackerRejection);
    assert_eq!(error.message, "Dupe of torrent 12");
    assert_eq!(sender.call_count(), 1);
}

#[tokio::test]
async fn test_retries_exhausted_surface_transport_error() {
    let sender = Arc::new(RecordingSender::new());
    for _ in 0..3 {
        sender.push_text(500, "Internal Server Error");
    }
    let mut config = TrackliftConfig::for_testing();
    config.upload.retry.max_attempts = 2;
    let coordinator = coordinator_with(Arc::clone(&sender), config);

    let err = coordinator
        .try_upload(request("YUS").await, UploadOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::Transport { status: Some(500), .. }));
    assert_eq!(sender.call_count(), 2);
}

#[tokio::test]
async fn test_concurrent_uploads_share_one_coordinator() {
    let sender = Arc::new(RecordingSender::new());
    let coordinator = Arc::new(coordinator(Arc::clone(&sender)));

    let mut handles = Vec::new();
    for tracker in ["YUS", "SP", "HEAD"] {
        let coordinator = Arc::clone(&coordinator);
        let request = request(tracker).await;
        handles.push(tokio::spawn(async move {
            coordinator.upload(request, UploadOptions::default()).await
        }));
    }

    for handle in handles {
        let result = handle.await.unwrap();
        assert!(result.is_success(), "{result:?}");
    }
    assert_eq!(sender.call_count(), 3);
}
