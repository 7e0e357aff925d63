//! Backend resolution and request construction from JSON configuration

use std::sync::Arc;

use tracklift_core::tracker::test_mocks::RecordingSender;
use tracklift_core::tracker::{
    ConfigError, HttpSender, RequestBody, TorrentAttachment, TrackerClient, TrackerConfig,
    TrackerConfigSet, TrackerRegistry, Transport,
};

use super::support::{built_torrent, metadata, trackers};

fn sender() -> Arc<dyn HttpSender> {
    Arc::new(RecordingSender::new())
}

fn client(id: &str) -> Arc<dyn TrackerClient> {
    let trackers = trackers();
    let config = trackers.get(id).unwrap();
    TrackerRegistry::with_builtin_backends()
        .instantiate(config, sender())
        .unwrap()
}

async fn prepared(id: &str) -> tracklift_core::tracker::PreparedRequest {
    let client = client(id);
    let torrent = TorrentAttachment::new(built_torrent().await, "release.torrent").unwrap();
    let payload = client
        .build_payload(&metadata(), "notes", &torrent, None)
        .unwrap();
    client.prepare_request(&payload).unwrap()
}

#[test]
fn test_backends_resolve_case_insensitively() {
    let registry = TrackerRegistry::with_builtin_backends();
    let lower = registry.resolve("yus").unwrap()(TrackerConfig::new("yus"), sender());
    let upper = registry.resolve("YUS").unwrap()(TrackerConfig::new("YUS"), sender());
    assert_eq!(lower.backend_name(), upper.backend_name());

    // `SP` has no explicit backend and falls back to its own id.
    assert_eq!(client("sp").backend_name(), "sp");
    assert_eq!(client("Head").backend_name(), "generic");
}

#[test]
fn test_configuration_loading() {
    let trackers = trackers();
    assert_eq!(trackers.len(), 5);
    assert_eq!(trackers.enabled().count(), 4);

    let yus = trackers.get("YuS").unwrap();
    assert_eq!(yus.id, "YUS");
    assert_eq!(yus.category_ids.get("ALBUM").map(String::as_str), Some("1"));
    assert_eq!(yus.format_ids.get("FLAC").map(String::as_str), Some("5"));

    assert_eq!(
        trackers.get("SP").unwrap().base_url.as_deref(),
        Some("https://sp.example")
    );
    assert!(matches!(
        trackers.get("missing"),
        Err(ConfigError::UnknownTracker { .. })
    ));
}

#[test]
fn test_invalid_configuration_rejected() {
    let relative_without_base = r#"{"trackers": {"X": {"api_key": "k", "upload_url": "/upload"}}}"#;
    assert!(matches!(
        TrackerConfigSet::from_json_str(relative_without_base),
        Err(ConfigError::InvalidUrl { .. })
    ));

    let wrong_type = r#"{"trackers": {"X": {"category_ids": {"ALBUM": [1]}}}}"#;
    assert!(matches!(
        TrackerConfigSet::from_json_str(wrong_type),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn test_is_configured_for_every_missing_api_subset() {
    let registry = TrackerRegistry::with_builtin_backends();
    for mask in 0u8..4 {
        let mut config = TrackerConfig::new("API");
        config.backend = Some("generic".to_string());
        config.use_api = Some(true);
        if mask & 1 != 0 {
            config.api_key = "key-123".to_string();
        }
        if mask & 2 != 0 {
            config.upload_url = Some("https://api.example/upload".to_string());
        }

        let client = registry.instantiate(&config, sender()).unwrap();
        assert_eq!(client.transport(), Transport::Api);
        assert_eq!(client.is_configured(), mask == 3, "mask = {mask:02b}");
    }
}

#[test]
fn test_is_configured_for_every_missing_web_form_subset() {
    let registry = TrackerRegistry::with_builtin_backends();
    for mask in 0u8..16 {
        let mut config = TrackerConfig::new("WEB");
        config.backend = Some("generic".to_string());
        config.use_api = Some(false);
        if mask & 1 != 0 {
            config.upload_url = Some("https://web.example/upload.php".to_string());
        }
        if mask & 2 != 0 {
            config.api_key = "key-123".to_string();
        }
        if mask & 4 != 0 {
            config.username = "user".to_string();
        }
        if mask & 8 != 0 {
            config.password = "pass".to_string();
        }

        let has_url = mask & 1 != 0;
        let has_credentials = mask & 2 != 0 || (mask & 4 != 0 && mask & 8 != 0);
        let client = registry.instantiate(&config, sender()).unwrap();
        assert_eq!(client.transport(), Transport::WebForm);
        assert_eq!(
            client.is_configured(),
            has_url && has_credentials,
            "mask = {mask:04b}"
        );
    }
}

#[tokio::test]
async fn test_bearer_credentials_in_header() {
    let request = prepared("YUS").await;
    assert_eq!(request.header("authorization"), Some("Bearer yuskey-0001"));
    assert_eq!(request.query_param("api_token"), None);
    assert_eq!(request.url.as_str(), "https://yus.example/api/torrents/upload");
    assert_eq!(request.body_field("cat").as_deref(), Some("1"));
    assert_eq!(request.body_field("format").as_deref(), Some("5"));
}

#[tokio::test]
async fn test_param_credentials_in_form_body() {
    let request = prepared("SP").await;
    assert_eq!(request.body_field("api_token").as_deref(), Some("spkey-0002"));
    assert_eq!(request.header("Authorization"), None);
    assert_eq!(request.query_param("api_token"), None);
    assert_eq!(request.body_field("category_id").as_deref(), Some("3"));
    assert_eq!(request.body_field("type_id").as_deref(), Some("9"));

    let redacted = request.redacted(&["spkey-0002"]);
    assert!(!redacted.contains("spkey-0002"));
    assert!(redacted.contains("spke****"));
}

#[tokio::test]
async fn test_param_credentials_in_query_for_json() {
    let json = r#"{"trackers": {"Q": {
        "backend": "generic",
        "api_key": "querykey",
        "upload_url": "https://q.example/api/upload",
        "auth_type": "param",
        "payload_format": "json",
        "category_ids": {"ALBUM": 1},
        "format_ids": {"FLAC": 1}
    }}}"#;
    let trackers = TrackerConfigSet::from_json_str(json).unwrap();
    let client = TrackerRegistry::with_builtin_backends()
        .instantiate(trackers.get("Q").unwrap(), sender())
        .unwrap();
    let torrent = TorrentAttachment::new(built_torrent().await, "release.torrent").unwrap();
    let payload = client.build_payload(&metadata(), "", &torrent, None).unwrap();
    let request = client.prepare_request(&payload).unwrap();

    assert_eq!(request.query_param("api_token").as_deref(), Some("querykey"));
    assert_eq!(request.body_field("api_token"), None);
}

#[tokio::test]
async fn test_token_credentials_in_custom_header() {
    let request = prepared("HEAD").await;
    assert_eq!(request.header("x-head-key"), Some("headkey-0003"));
    assert_eq!(request.header("Authorization"), None);

    let RequestBody::Json(body) = &request.body else {
        panic!("expected a JSON body");
    };
    assert_eq!(body["category_id"], "11");
    assert!(body["torrent"].as_str().is_some_and(|encoded| !encoded.is_empty()));
}

#[tokio::test]
async fn test_web_form_login_credentials() {
    let request = prepared("FORM").await;
    assert_eq!(request.transport, Transport::WebForm);
    assert!(
        request
            .header("Authorization")
            .is_some_and(|value| value.starts_with("Basic "))
    );
    assert!(matches!(request.body, RequestBody::Multipart(_)));

    // base64("uploader:hunter22")
    let redacted = request.redacted(&[]);
    assert!(!redacted.contains("dXBsb2FkZXI6aHVudGVyMjI="));
    assert!(!redacted.contains("hunter22"));
    assert!(redacted.contains("Authorization: Basic dXBs****"));
}
