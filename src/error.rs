//! Error types for result construction, wire decoding, configuration and
//! coordinator handles.
//!
//! Network and protocol failures are not errors here: they are
//! [`DeliveryOutcome`](crate::transport::DeliveryOutcome) values that the
//! coordinator turns into retries or an abandoned disposition.

/// Failure to construct a [`TaskResult`](crate::TaskResult) locally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResultError {
    /// Contents exceed [`MAX_CONTENTS_LEN`](crate::constants::MAX_CONTENTS_LEN).
    #[error("result contents of {actual} bytes exceed the {limit} byte limit")]
    ContentsTooLarge { limit: usize, actual: usize },
}

/// Failure to decode a wire-format result.
///
/// Decoding runs on bytes that may come from a noisy or hostile network,
/// so every failure mode is a variant here and none of them panic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Input ended before a complete document was read.
    #[error("truncated input: {0}")]
    Truncated(String),

    /// Input is not well-formed JSON.
    #[error("malformed input: {0}")]
    Malformed(String),

    /// Input is JSON but not shaped like a result submission.
    #[error("unexpected shape: {0}")]
    UnexpectedShape(String),

    /// The task identifier is not a valid UUID.
    #[error("invalid task identifier '{0}'")]
    InvalidIdentifier(String),

    /// The success flag is neither a boolean nor `"true"`/`"false"`.
    #[error("invalid success flag: {0}")]
    InvalidSuccessFlag(String),

    /// The contents could not be decoded with the declared encoding.
    #[error("invalid contents: {0}")]
    InvalidContents(String),

    /// Decoded contents exceed the wire limit.
    #[error("contents of {actual} bytes exceed the {limit} byte limit")]
    ContentsTooLarge { limit: usize, actual: usize },

    /// A single-result decode found zero or several results.
    #[error("expected exactly one result, found {0}")]
    BatchSize(usize),
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        match err.classify() {
            serde_json::error::Category::Eof => Self::Truncated(err.to_string()),
            serde_json::error::Category::Syntax | serde_json::error::Category::Io => {
                Self::Malformed(err.to_string())
            }
            serde_json::error::Category::Data => Self::UnexpectedShape(err.to_string()),
        }
    }
}

impl From<ResultError> for DecodeError {
    fn from(err: ResultError) -> Self {
        match err {
            ResultError::ContentsTooLarge { limit, actual } => {
                Self::ContentsTooLarge { limit, actual }
            }
        }
    }
}

/// Errors that occur while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The TOML document is malformed or does not match the schema.
    #[error("failed to parse config TOML: {source}")]
    Parse {
        #[from]
        source: toml::de::Error,
    },

    /// The config file could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Io {
        source: std::io::Error,
        path: String,
    },

    /// The config parsed but holds an unusable value.
    #[error("config validation error: {message}")]
    Validation { message: String },
}

impl ConfigError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Errors returned by [`CourierHandle`](crate::CourierHandle) operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CourierError {
    /// The coordinator has shut down and no longer accepts commands.
    #[error("courier is shut down")]
    Closed,
}
