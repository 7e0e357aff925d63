//! In-memory HTTP sender for tests
//!
//! Responses are scripted in order; every request is recorded so tests can
//! assert on credentials, fields and call counts without a network.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use super::http::{HttpResponse, HttpSender, PreparedRequest, SendError};

/// Scripted sender that records every request it receives.
pub struct RecordingSender {
    responses: Mutex<VecDeque<Result<HttpResponse, SendError>>>,
    requests: Mutex<Vec<PreparedRequest>>,
    delay: Option<Duration>,
}

impl Default for RecordingSender {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingSender {
    /// Sender answering `{"success": true}` once the script is exhausted.
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sender that waits `delay` before answering each request.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    /// Queues a JSON response.
    pub fn push_json(&self, status: u16, body: &str) {
        self.push_response(HttpResponse {
            status,
            content_type: Some("application/json".to_string()),
            body: Bytes::copy_from_slice(body.as_bytes()),
        });
    }

    /// Queues a plain-text response.
    pub fn push_text(&self, status: u16, body: &str) {
        self.push_response(HttpResponse {
            status,
            content_type: Some("text/html".to_string()),
            body: Bytes::copy_from_slice(body.as_bytes()),
        });
    }

    pub fn push_response(&self, response: HttpResponse) {
        self.responses.lock().push_back(Ok(response));
    }

    /// Queues a transport failure.
    pub fn push_error(&self, error: SendError) {
        self.responses.lock().push_back(Err(error));
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<PreparedRequest> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<PreparedRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl HttpSender for RecordingSender {
    async fn send(&self, request: &PreparedRequest) -> Result<HttpResponse, SendError> {
        self.requests.lock().push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.responses.lock().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(HttpResponse {
                status: 200,
                content_type: Some("application/json".to_string()),
                body: Bytes::from_static(br#"{"success": true}"#),
            })
        })
    }
}
