//! Transport seam between the coordinator and the network.
//!
//! A [`ResultTransport`] performs exactly one submission attempt and
//! classifies it as a [`DeliveryOutcome`]. It never retries on its own;
//! retry policy belongs to the [`Courier`](crate::Courier).

pub mod http;

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

pub use http::HttpTransport;

/// Classified result of one submission attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The listening post accepted the submission (2xx).
    Acknowledged,
    /// The listening post refused the payload itself (4xx). Retrying the
    /// same bytes cannot succeed.
    Rejected(String),
    /// Transient failure: connection refused or reset, timeout, 5xx.
    Unavailable(String),
    /// The host name could not be resolved.
    Unreachable(String),
}

impl DeliveryOutcome {
    /// Whether the coordinator should schedule another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Unreachable(_))
    }

    /// Short label for logs and events.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Acknowledged => "acknowledged",
            Self::Rejected(_) => "rejected",
            Self::Unavailable(_) => "unavailable",
            Self::Unreachable(_) => "unreachable",
        }
    }

    /// Failure reason, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Acknowledged => None,
            Self::Rejected(reason) | Self::Unavailable(reason) | Self::Unreachable(reason) => {
                Some(reason)
            }
        }
    }
}

impl fmt::Display for DeliveryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{}: {reason}", self.label()),
            None => write!(f, "{}", self.label()),
        }
    }
}

/// Single-attempt submission of an encoded result.
///
/// Implementations must not panic on network failures; every failure is a
/// [`DeliveryOutcome`]. `submit` suspends the calling task while waiting on
/// the network and is never called twice concurrently for the same result.
#[async_trait]
pub trait ResultTransport: Send + Sync {
    /// Sends `body` once and classifies the response.
    async fn submit(&self, body: Bytes) -> DeliveryOutcome;
}

#[async_trait]
impl<T: ResultTransport + ?Sized> ResultTransport for std::sync::Arc<T> {
    async fn submit(&self, body: Bytes) -> DeliveryOutcome {
        (**self).submit(body).await
    }
}
