//! Defaults for the listening post endpoint, retry policy and wire limits.

/// Default listening post host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default listening post port.
pub const DEFAULT_PORT: u16 = 5000;

/// Default submission path on the listening post.
pub const DEFAULT_URI: &str = "/results";

/// Largest `contents` payload a single result may carry (4 MiB).
pub const MAX_CONTENTS_LEN: usize = 4 * 1024 * 1024;

/// Default number of submit attempts per result, the first one included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay before the first retry (milliseconds).
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 500;

/// Default ceiling on a single backoff delay (milliseconds).
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;

/// Default backoff growth factor between consecutive retries.
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Default jitter, as a fraction of the computed delay (+/-25%).
pub const DEFAULT_JITTER: f64 = 0.25;

/// Default bound on one submit attempt (milliseconds).
pub const DEFAULT_ATTEMPT_TIMEOUT_MS: u64 = 10_000;

/// Default capacity of the coordinator intake queue.
pub const DEFAULT_INTAKE_CAPACITY: usize = 256;

/// Capacity of the delivery event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Terminal reports retained in a [`ShutdownSummary`](crate::ShutdownSummary).
pub const MAX_SUMMARY_REPORTS: usize = 1024;

/// Longest response body excerpt kept in a rejection or unavailability reason.
pub const MAX_REASON_BODY_LEN: usize = 256;

/// Marker written in the `encoding` member for base64 contents.
pub const BASE64_ENCODING: &str = "base64";

/// `User-Agent` sent with every submission.
pub const USER_AGENT: &str = concat!("result-courier/", env!("CARGO_PKG_VERSION"));
