//! Timeout-bounded HTTP dispatch.
//!
//! One outbound call per invocation, bounded by a deadline, with
//! transport failures normalized into [`HelixError`]. The dispatcher
//! hands back the raw status and body; interpreting resource statuses
//! is the caller's job.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use tracing::debug;

use crate::error::HelixError;

/// Default per-request deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const CLIENT_ID_HEADER: &str = "Client-Id";

/// Raw response as handed back by the dispatcher: status plus body,
/// uninterpreted.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

impl RawResponse {
    #[inline]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Outbound HTTP seam.
///
/// `attach_auth` controls whether bearer-auth headers are added; when it
/// is set, a missing `token` fails fast with [`HelixError::MissingToken`]
/// before any I/O, since the token manager should have supplied one.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn dispatch(
        &self,
        resource: &'static str,
        url: &str,
        method: Method,
        attach_auth: bool,
        token: Option<String>,
        client_id: &str,
    ) -> Result<RawResponse, HelixError>;
}

/// Build a `reqwest::Client` suitable for the dispatcher.
pub fn default_client() -> Client {
    Client::builder()
        .build()
        .expect("Failed to create HTTP client")
}

/// The reqwest-backed [`Transport`].
#[derive(Debug, Clone)]
pub struct RequestDispatcher {
    client: Client,
    timeout: Duration,
}

impl RequestDispatcher {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn with_default_timeout(client: Client) -> Self {
        Self::new(client, DEFAULT_TIMEOUT)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl Transport for RequestDispatcher {
    async fn dispatch(
        &self,
        resource: &'static str,
        url: &str,
        method: Method,
        attach_auth: bool,
        token: Option<String>,
        client_id: &str,
    ) -> Result<RawResponse, HelixError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if !matches!(method, Method::GET | Method::HEAD) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        let mut request = self
            .client
            .request(method, url)
            .headers(headers)
            .timeout(self.timeout);

        if attach_auth {
            let token = token.ok_or(HelixError::MissingToken)?;
            request = request
                .bearer_auth(token)
                .header(CLIENT_ID_HEADER, client_id);
        }

        let timeout_ms = self.timeout.as_millis() as u64;
        debug!(resource, attach_auth, "dispatching request");

        let map_transport_err = move |e: reqwest::Error| {
            if e.is_timeout() {
                HelixError::Timeout {
                    resource,
                    timeout_ms,
                }
            } else {
                HelixError::Network(e)
            }
        };

        // The deadline covers the full exchange, body included; a late
        // body never yields a partial response.
        let response = request.send().await.map_err(map_transport_err)?;
        let status = response.status();
        let body = response.text().await.map_err(map_transport_err)?;

        Ok(RawResponse { status, body })
    }
}
