//! HTTP transport for upload requests
//!
//! Backends produce a [`PreparedRequest`]; an [`HttpSender`] delivers it.
//! Keeping request construction separate from sending lets debug mode log the
//! exact request and lets tests inspect credential placement without a server.

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use super::types::{PayloadValue, Transport};
use crate::config::UploadConfig;

/// Encoded request body.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Json(serde_json::Value),
    Multipart(Vec<(String, PayloadValue)>),
}

/// Fully resolved upload request.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub url: Url,
    pub transport: Transport,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl PreparedRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn query_param(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// Text value of a multipart field or top-level JSON string.
    pub fn body_field(&self, name: &str) -> Option<String> {
        match &self.body {
            RequestBody::Multipart(parts) => parts
                .iter()
                .find(|(key, _)| key == name)
                .and_then(|(_, value)| value.as_text())
                .map(str::to_string),
            RequestBody::Json(value) => value
                .get(name)
                .and_then(serde_json::Value::as_str)
                .map(str::to_string),
        }
    }

    /// One-line description with every `secrets` entry masked wherever it
    /// appears. `Authorization` credentials are always masked, so a Basic
    /// token derived from a login never reaches the log.
    pub fn redacted(&self, secrets: &[&str]) -> String {
        let mask = |text: &str| {
            secrets
                .iter()
                .filter(|secret| !secret.is_empty())
                .fold(text.to_string(), |text, secret| {
                    text.replace(secret, &mask_secret(secret))
                })
        };

        let headers = self
            .headers
            .iter()
            .map(|(key, value)| {
                if key.eq_ignore_ascii_case("authorization") {
                    let shown = match value.split_once(' ') {
                        Some((scheme, credential)) => format!("{scheme} {}", mask_secret(credential)),
                        None => mask_secret(value),
                    };
                    format!("{key}: {shown}")
                } else {
                    format!("{key}: {}", mask(value))
                }
            })
            .collect::<Vec<_>>()
            .join("; ");

        let body = match &self.body {
            RequestBody::Json(value) => mask(&summarize_json(value)),
            RequestBody::Multipart(parts) => parts
                .iter()
                .map(|(key, value)| match value {
                    PayloadValue::Text(text) => format!("{key}={}", mask(text)),
                    PayloadValue::File {
                        file_name, bytes, ..
                    } => format!("{key}=<{file_name}, {} bytes>", bytes.len()),
                })
                .collect::<Vec<_>>()
                .join(", "),
        };

        format!(
            "POST {} [{:?}] headers=[{}] body=[{}]",
            mask(self.url.as_str()),
            self.transport,
            headers,
            body
        )
    }
}

/// Shows the first four characters of a secret.
pub fn mask_secret(secret: &str) -> String {
    let prefix: String = secret.chars().take(4).collect();
    format!("{prefix}****")
}

/// JSON with long strings (base64 files) shortened.
fn summarize_json(value: &serde_json::Value) -> String {
    const LIMIT: usize = 64;
    match value {
        serde_json::Value::Object(map) => {
            let fields = map
                .iter()
                .map(|(key, value)| match value {
                    serde_json::Value::String(text) if text.len() > LIMIT => {
                        format!("{key}=<{} chars>", text.len())
                    }
                    other => format!("{key}={other}"),
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("{{{fields}}}")
        }
        other => other.to_string(),
    }
}

/// Raw HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl HttpResponse {
    /// JSON by content type, or by body for trackers that label JSON as HTML.
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|content_type| content_type.contains("json"))
            || self
                .body
                .iter()
                .find(|byte| !byte.is_ascii_whitespace())
                .is_some_and(|&byte| byte == b'{')
    }
}

/// Failures below the HTTP status level.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SendError {
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Connection to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    #[error("Request failed: {reason}")]
    Other { reason: String },
}

/// Delivers prepared requests.
///
/// Implementations must not retry; the coordinator owns retry policy.
#[async_trait]
pub trait HttpSender: Send + Sync {
    /// Sends `request` and returns the response whatever its status.
    ///
    /// # Errors
    /// - `SendError` - No response was received
    async fn send(&self, request: &PreparedRequest) -> Result<HttpResponse, SendError>;
}

/// `reqwest`-backed sender.
///
/// API requests go through a plain client; web-form requests go through a
/// session client that keeps cookies between requests.
pub struct ReqwestSender {
    api: reqwest::Client,
    session: reqwest::Client,
}

impl ReqwestSender {
    /// Creates both clients using timeouts and user agent from `config`.
    ///
    /// # Errors
    /// - `SendError::Other` - The TLS backend could not be initialized
    pub fn new(config: &UploadConfig) -> Result<Self, SendError> {
        let build = |cookies: bool| {
            reqwest::Client::builder()
                .timeout(config.request_timeout)
                .user_agent(config.user_agent)
                .redirect(reqwest::redirect::Policy::limited(3))
                .cookie_store(cookies)
                .build()
                .map_err(|e| SendError::Other {
                    reason: format!("HTTP client creation failed: {e}"),
                })
        };

        Ok(Self {
            api: build(false)?,
            session: build(true)?,
        })
    }

    fn build_multipart(parts: &[(String, PayloadValue)]) -> Result<reqwest::multipart::Form, SendError> {
        let mut form = reqwest::multipart::Form::new();
        for (name, value) in parts {
            form = match value {
                PayloadValue::Text(text) => form.text(name.clone(), text.clone()),
                PayloadValue::File {
                    file_name,
                    content_type,
                    bytes,
                } => {
                    let part = reqwest::multipart::Part::bytes(bytes.to_vec())
                        .file_name(file_name.clone())
                        .mime_str(content_type)
                        .map_err(|e| SendError::Other {
                            reason: format!("invalid content type {content_type}: {e}"),
                        })?;
                    form.part(name.clone(), part)
                }
            };
        }
        Ok(form)
    }
}

#[async_trait]
impl HttpSender for ReqwestSender {
    async fn send(&self, request: &PreparedRequest) -> Result<HttpResponse, SendError> {
        let client = match request.transport {
            Transport::Api => &self.api,
            Transport::WebForm => &self.session,
        };

        let mut builder = client.post(request.url.clone());
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        builder = match &request.body {
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart(parts) => builder.multipart(Self::build_multipart(parts)?),
        };

        let url = request.url.to_string();
        tracing::debug!("Sending {:?} upload to {}", request.transport, request.url.host_str().unwrap_or("?"));

        let response = builder.send().await.map_err(|e| {
            tracing::warn!("HTTP request to {} failed: {}", url, e);
            if e.is_timeout() {
                SendError::Timeout { url: url.clone() }
            } else if e.is_connect() {
                SendError::Connect {
                    url: url.clone(),
                    reason: e.to_string(),
                }
            } else {
                SendError::Other {
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                SendError::Timeout { url: url.clone() }
            } else {
                SendError::Other {
                    reason: format!("Failed to read response body: {e}"),
                }
            }
        })?;

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PreparedRequest {
        PreparedRequest {
            url: Url::parse("https://t.example/upload?api_token=SECRETKEY123").unwrap(),
            transport: Transport::Api,
            headers: vec![("Authorization".to_string(), "Bearer SECRETKEY123".to_string())],
            body: RequestBody::Multipart(vec![
                ("name".to_string(), PayloadValue::text("Album")),
                (
                    "torrent".to_string(),
                    PayloadValue::File {
                        file_name: "a.torrent".to_string(),
                        content_type: "application/x-bittorrent".to_string(),
                        bytes: Bytes::from_static(b"d4:infodee"),
                    },
                ),
            ]),
        }
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("SECRETKEY123"), "SECR****");
        assert_eq!(mask_secret("ab"), "ab****");
    }

    #[test]
    fn test_redacted_hides_secret() {
        let text = request().redacted(&["SECRETKEY123"]);
        assert!(!text.contains("SECRETKEY123"));
        assert!(text.contains("Bearer SECR****"));
        assert!(text.contains("api_token=SECR****"));
        assert!(text.contains("torrent=<a.torrent, 10 bytes>"));
    }

    #[test]
    fn test_redacted_masks_authorization_without_secrets() {
        let mut request = request();
        request.headers = vec![
            ("Authorization".to_string(), "Basic dXBsb2FkZXI6aHVudGVyMjI=".to_string()),
            ("X-Upload-Token".to_string(), "tok-998877".to_string()),
        ];
        request.url = Url::parse("https://t.example/upload").unwrap();

        let text = request.redacted(&[]);
        assert!(!text.contains("dXBsb2FkZXI6aHVudGVyMjI="));
        assert!(text.contains("Authorization: Basic dXBs****"));
        // Other headers are only masked when their secret is known.
        assert!(text.contains("X-Upload-Token: tok-998877"));

        let text = request.redacted(&["", "tok-998877"]);
        assert!(text.contains("X-Upload-Token: tok-****"));
    }

    #[test]
    fn test_lookups() {
        let request = request();
        assert_eq!(request.header("authorization"), Some("Bearer SECRETKEY123"));
        assert_eq!(request.query_param("api_token").as_deref(), Some("SECRETKEY123"));
        assert_eq!(request.body_field("name").as_deref(), Some("Album"));
        assert_eq!(request.body_field("torrent"), None);
    }

    #[test]
    fn test_summarize_json_shortens_long_strings() {
        let value = serde_json::json!({"name": "x", "torrent": "A".repeat(100)});
        let summary = summarize_json(&value);
        assert!(summary.contains("torrent=<100 chars>"));
        assert!(summary.contains("name=\"x\""));
    }

    #[test]
    fn test_is_json() {
        let response = |content_type: &str, body: &'static [u8]| HttpResponse {
            status: 200,
            content_type: Some(content_type.to_string()),
            body: Bytes::from_static(body),
        };
        assert!(response("application/json; charset=utf-8", b"").is_json());
        assert!(response("text/html", b"  {\"success\": true}").is_json());
        assert!(!response("text/html", b"<html>Upload complete</html>").is_json());
    }

    #[test]
    fn test_reqwest_sender_builds() {
        assert!(ReqwestSender::new(&UploadConfig::default()).is_ok());
    }
}
