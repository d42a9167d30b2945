//! HTTP(S) transport built on `reqwest`.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

use crate::codec;
use crate::config::EndpointConfig;
use crate::constants::{MAX_REASON_BODY_LEN, USER_AGENT};
use crate::error::ConfigError;
use crate::transport::{DeliveryOutcome, ResultTransport};

/// Posts encoded results to the listening post.
///
/// One `HttpTransport` wraps one pooled [`reqwest::Client`], so keep-alive
/// connections are reused across submissions. TLS is negotiated (rustls)
/// when the endpoint scheme is `https`.
///
/// # Examples
///
/// ```
/// use result_courier::config::EndpointConfig;
/// use result_courier::transport::HttpTransport;
/// use std::time::Duration;
///
/// let endpoint = EndpointConfig::new("localhost", 5000, "/results");
/// let transport = HttpTransport::new(&endpoint, Duration::from_secs(10)).unwrap();
/// assert_eq!(transport.url().as_str(), "http://localhost:5000/results");
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    url: Url,
}

impl HttpTransport {
    /// Builds a transport for `endpoint`. Each request is bounded by
    /// `attempt_timeout`.
    pub fn new(endpoint: &EndpointConfig, attempt_timeout: Duration) -> Result<Self, ConfigError> {
        let url = endpoint.url()?;

        let mut headers = HeaderMap::new();
        for (name, value) in &endpoint.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ConfigError::validation(format!("invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                ConfigError::validation(format!("invalid value for header '{name}': {e}"))
            })?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(attempt_timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| ConfigError::validation(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, url })
    }

    /// Submission URL.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ResultTransport for HttpTransport {
    async fn submit(&self, body: Bytes) -> DeliveryOutcome {
        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, codec::CONTENT_TYPE)
            .body(body)
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) => return classify_error(&err),
        };

        let status = response.status();
        if status.is_success() {
            // The body is the listening post's pending task list; task
            // acquisition is not this client's concern.
            return DeliveryOutcome::Acknowledged;
        }
        let body = read_reason_body(response).await;
        classify_status(status, &body)
    }
}

/// Reads at most `MAX_REASON_BODY_LEN + 1` bytes of an error response, so
/// an oversized body is never buffered and the excerpt still shows it was
/// cut.
async fn read_reason_body(mut response: reqwest::Response) -> String {
    let limit = MAX_REASON_BODY_LEN + 1;
    let mut body = Vec::with_capacity(limit);
    while body.len() < limit {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = chunk.len().min(limit - body.len());
                body.extend_from_slice(&chunk[..take]);
            }
            Ok(None) => break,
            Err(err) => {
                tracing::debug!(error = %err, "failed to read error response body");
                break;
            }
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

/// Maps a non-transport-failure response to an outcome.
pub fn classify_status(status: StatusCode, body: &str) -> DeliveryOutcome {
    if status.is_success() {
        return DeliveryOutcome::Acknowledged;
    }
    let reason = status_reason(status, body);
    if status.is_server_error() {
        DeliveryOutcome::Unavailable(reason)
    } else {
        // 4xx, and anything reqwest's redirect policy handed back unresolved.
        DeliveryOutcome::Rejected(reason)
    }
}

fn status_reason(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return format!("HTTP {}", status.as_u16());
    }
    let mut end = body.len().min(MAX_REASON_BODY_LEN);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    let ellipsis = if end < body.len() { "..." } else { "" };
    format!("HTTP {}: {}{}", status.as_u16(), &body[..end], ellipsis)
}

/// Maps a `reqwest` failure (no response received) to an outcome.
pub fn classify_error(err: &reqwest::Error) -> DeliveryOutcome {
    let message = error_chain(err);
    if err.is_timeout() {
        DeliveryOutcome::Unavailable(format!("request timed out: {message}"))
    } else if is_name_resolution_failure(&message) {
        DeliveryOutcome::Unreachable(message)
    } else if err.is_builder() {
        DeliveryOutcome::Rejected(format!("request could not be built: {message}"))
    } else {
        // Refused, reset, TLS handshake failure and friends.
        DeliveryOutcome::Unavailable(message)
    }
}

fn is_name_resolution_failure(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    [
        "dns error",
        "failed to lookup address",
        "name or service not known",
        "nodename nor servname",
        "no such host",
    ]
    .iter()
    .any(|needle| message.contains(needle))
}

fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !parts.iter().any(|p| p.contains(&text)) {
            parts.push(text);
        }
        source = cause.source();
    }
    parts.join(": ")
}
