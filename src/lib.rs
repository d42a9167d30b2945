//! # result-courier
//!
//! Reliable delivery of finished task results to a listening post.
//!
//! A task source hands [`TaskResult`]s to a [`Courier`]. The courier
//! encodes each result ([`codec`]), posts it to the configured endpoint
//! through a [`ResultTransport`], and retries transient failures with
//! exponential backoff until the result is acknowledged or abandoned.
//!
//! # Delivery guarantees
//!
//! - At-least-once per task identifier while retry budget remains. The
//!   listening post must treat repeated submissions of one identifier as
//!   idempotent.
//! - No ordering between different tasks.
//! - Never two concurrent submissions for the same result.
//! - No network or protocol failure panics or stops the process; each one
//!   becomes a retry or an abandoned disposition that is logged.
//!
//! # Module Organization
//!
//! - [`types`] - [`TaskId`] and [`TaskResult`]
//! - [`codec`] - wire encoding for submissions
//! - [`config`] - endpoint, retry policy and TOML/env loading
//! - [`transport`] - single-attempt submission over HTTP(S)
//! - [`retry`] - exponential backoff with jitter
//! - [`delivery`] - state machine, events and the coordinator loop
//! - [`error`] - error types

pub mod codec;
pub mod config;
pub mod constants;
pub mod delivery;
pub mod error;
pub mod retry;
pub mod transport;
pub mod types;

pub use config::{CourierConfig, EndpointConfig, RetryPolicy, Scheme};
pub use delivery::{
    AbandonReason, Courier, CourierHandle, DeliveryEvent, DeliveryReport, DeliveryState,
    Disposition, EventKind, ShutdownSummary,
};
pub use error::{ConfigError, CourierError, DecodeError, ResultError};
pub use transport::{DeliveryOutcome, HttpTransport, ResultTransport};
pub use types::{TaskId, TaskResult};
