//! Courier configuration: listening post endpoint, retry policy and intake
//! sizing.
//!
//! Configuration is fixed when a [`Courier`](crate::Courier) is built. To
//! point at a different endpoint, build a new courier.
//!
//! # Example TOML
//!
//! ```toml
//! intake_capacity = 256
//!
//! [endpoint]
//! scheme = "http"
//! host = "localhost"
//! port = 5000
//! uri = "/results"
//!
//! [retry]
//! max_attempts = 5
//! initial_backoff_ms = 500
//! max_backoff_ms = 30000
//! multiplier = 2.0
//! jitter = 0.25
//! attempt_timeout_ms = 10000
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::constants::{
    DEFAULT_ATTEMPT_TIMEOUT_MS, DEFAULT_HOST, DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_INTAKE_CAPACITY,
    DEFAULT_JITTER, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BACKOFF_MS, DEFAULT_MULTIPLIER,
    DEFAULT_PORT, DEFAULT_URI,
};
use crate::error::ConfigError;

/// URL scheme used to reach the listening post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Plain HTTP.
    #[default]
    Http,
    /// HTTP over TLS.
    Https,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::Https => write!(f, "https"),
        }
    }
}

impl std::str::FromStr for Scheme {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            other => Err(ConfigError::validation(format!(
                "unsupported scheme '{other}' (expected http or https)"
            ))),
        }
    }
}

/// Address of the listening post's submission endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// `http` or `https`.
    #[serde(default)]
    pub scheme: Scheme,
    /// Host name or IP address.
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Submission path, starting with `/`.
    #[serde(default = "default_uri")]
    pub uri: String,
    /// Extra headers sent with every submission.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_uri() -> String {
    DEFAULT_URI.to_string()
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            scheme: Scheme::default(),
            host: default_host(),
            port: default_port(),
            uri: default_uri(),
            headers: BTreeMap::new(),
        }
    }
}

impl EndpointConfig {
    /// Creates an HTTP endpoint for `host:port` + `uri`.
    pub fn new(host: impl Into<String>, port: u16, uri: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            uri: uri.into(),
            ..Self::default()
        }
    }

    /// Switches the scheme.
    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Adds a header sent with every submission.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Splits a full URL such as `https://post.example:8443/results` into an
    /// endpoint. A missing port falls back to the scheme's default.
    pub fn from_url(raw: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(raw)
            .map_err(|e| ConfigError::validation(format!("invalid URL '{raw}': {e}")))?;
        let scheme: Scheme = url.scheme().parse()?;
        let host = url
            .host_str()
            .ok_or_else(|| ConfigError::validation(format!("URL '{raw}' has no host")))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ConfigError::validation(format!("URL '{raw}' has no port")))?;
        let endpoint = Self {
            scheme,
            host,
            port,
            uri: url.path().to_string(),
            headers: BTreeMap::new(),
        };
        endpoint.validate()?;
        Ok(endpoint)
    }

    /// Full submission URL.
    pub fn url(&self) -> Result<Url, ConfigError> {
        self.validate()?;
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        let raw = format!("{}://{}:{}{}", self.scheme, host, self.port, self.uri);
        Url::parse(&raw).map_err(|e| ConfigError::validation(format!("invalid endpoint '{raw}': {e}")))
    }

    /// Checks host, port and path.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::validation("endpoint host must not be empty"));
        }
        if self.port == 0 {
            return Err(ConfigError::validation("endpoint port must be non-zero"));
        }
        if !self.uri.starts_with('/') {
            return Err(ConfigError::validation(format!(
                "endpoint uri '{}' must start with '/'",
                self.uri
            )));
        }
        Ok(())
    }
}

/// Retry and timeout policy applied to every pending result.
///
/// Delays grow as `initial_backoff * multiplier^(retry - 1)`, capped at
/// `max_backoff`, then spread by `+/- jitter` of the delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Submit attempts per result, the first one included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry (milliseconds).
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Ceiling on a single delay (milliseconds).
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Growth factor between consecutive delays.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Jitter as a fraction of the delay, in `[0, 1)`.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    /// Give up once waiting would push total elapsed time past this bound
    /// (milliseconds). Unbounded when absent.
    #[serde(default)]
    pub max_elapsed_ms: Option<u64>,
    /// Bound on a single submit attempt (milliseconds).
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_initial_backoff_ms() -> u64 {
    DEFAULT_INITIAL_BACKOFF_MS
}

fn default_max_backoff_ms() -> u64 {
    DEFAULT_MAX_BACKOFF_MS
}

fn default_multiplier() -> f64 {
    DEFAULT_MULTIPLIER
}

fn default_jitter() -> f64 {
    DEFAULT_JITTER
}

fn default_attempt_timeout_ms() -> u64 {
    DEFAULT_ATTEMPT_TIMEOUT_MS
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
            max_elapsed_ms: None,
            attempt_timeout_ms: default_attempt_timeout_ms(),
        }
    }
}

impl RetryPolicy {
    /// Sets the attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the first retry delay and the delay ceiling.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff_ms = duration_ms(initial);
        self.max_backoff_ms = duration_ms(max);
        self
    }

    /// Sets the growth factor.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the jitter fraction. `0.0` makes the schedule deterministic.
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Bounds total elapsed time per result.
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed_ms = Some(duration_ms(max_elapsed));
        self
    }

    /// Bounds a single submit attempt.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn max_elapsed(&self) -> Option<Duration> {
        self.max_elapsed_ms.map(Duration::from_millis)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Checks that the policy can make progress.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::validation("retry.max_attempts must be at least 1"));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigError::validation(format!(
                "retry.multiplier must be a finite number >= 1.0, got {}",
                self.multiplier
            )));
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(ConfigError::validation(format!(
                "retry.jitter must be in [0, 1), got {}",
                self.jitter
            )));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(ConfigError::validation(
                "retry.max_backoff_ms must not be below retry.initial_backoff_ms",
            ));
        }
        if self.attempt_timeout_ms == 0 {
            return Err(ConfigError::validation("retry.attempt_timeout_ms must be non-zero"));
        }
        Ok(())
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Top-level courier configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourierConfig {
    /// Where results are submitted.
    #[serde(default)]
    pub endpoint: EndpointConfig,
    /// How failed submissions are retried.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Results queued ahead of the delivery loop before intake waits.
    #[serde(default = "default_intake_capacity")]
    pub intake_capacity: usize,
}

fn default_intake_capacity() -> usize {
    DEFAULT_INTAKE_CAPACITY
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            retry: RetryPolicy::default(),
            intake_capacity: default_intake_capacity(),
        }
    }
}

impl CourierConfig {
    /// Creates a config for `endpoint` with default retry settings.
    pub fn new(endpoint: EndpointConfig) -> Self {
        Self {
            endpoint,
            ..Self::default()
        }
    }

    /// Replaces the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Parses and validates a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            source,
            path: path.display().to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Defaults overridden by `COURIER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overrides endpoint fields from `COURIER_SCHEME`, `COURIER_HOST`,
    /// `COURIER_PORT` and `COURIER_URI` when set.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(scheme) = lookup("COURIER_SCHEME") {
            self.endpoint.scheme = scheme.parse()?;
        }
        if let Some(host) = lookup("COURIER_HOST") {
            self.endpoint.host = host;
        }
        if let Some(port) = lookup("COURIER_PORT") {
            self.endpoint.port = port.parse().map_err(|_| {
                ConfigError::validation(format!("COURIER_PORT '{port}' is not a valid port"))
            })?;
        }
        if let Some(uri) = lookup("COURIER_URI") {
            self.endpoint.uri = uri;
        }
        Ok(())
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint.validate()?;
        self.retry.validate()?;
        if self.intake_capacity == 0 {
            return Err(ConfigError::validation("intake_capacity must be at least 1"));
        }
        Ok(())
    }
}
