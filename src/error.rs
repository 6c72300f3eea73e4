//! Error types for robotchat.
//!
//! Each variant carries a stable error code (SCREAMING_SNAKE_CASE) that is
//! included in the Display output and accessible via [`ChatError::code()`].

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// Missing or invalid operator configuration (e.g. the chat credential).
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// A required request field is missing or empty.
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";

    /// A collaborator answered with a non-2xx status.
    pub const UPSTREAM_FAILED: &str = "UPSTREAM_FAILED";

    /// A collaborator body could not be parsed.
    pub const PARSE_FAILED: &str = "PARSE_FAILED";

    /// The HTTP request itself failed (connect, timeout, body read).
    pub const REQUEST_FAILED: &str = "REQUEST_FAILED";

    /// The event stream reported an error or broke mid-read.
    pub const STREAM_FAILED: &str = "STREAM_FAILED";

    /// The operation was cancelled by its owner.
    pub const CANCELLED: &str = "CANCELLED";

    /// Local terminal or file I/O failed.
    pub const IO_FAILED: &str = "IO_FAILED";
}

/// Errors produced by the chat front-end.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Missing or invalid configuration.
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    ConfigError(String),

    /// A required input is missing.
    #[error("[{}] {}", error_codes::VALIDATION_FAILED, .0)]
    ValidationError(String),

    /// Collaborator returned a non-success status.
    #[error("[{}] HTTP {status}: {body}", error_codes::UPSTREAM_FAILED)]
    UpstreamError {
        /// Status code reported by the collaborator.
        status: u16,
        /// Raw response body, forwarded for diagnostics.
        body: String,
    },

    /// Collaborator output could not be parsed.
    #[error("[{}] {}", error_codes::PARSE_FAILED, .0)]
    ParseError(String),

    /// Transport-level failure.
    #[error("[{}] {}", error_codes::REQUEST_FAILED, .0)]
    RequestError(String),

    /// Streaming response failure.
    #[error("[{}] {}", error_codes::STREAM_FAILED, .0)]
    StreamError(String),

    /// Cancelled before completion.
    #[error("[{}] {}", error_codes::CANCELLED, .0)]
    Cancelled(String),

    /// Local I/O failure.
    #[error("[{}] {}", error_codes::IO_FAILED, .0)]
    IoError(String),
}

impl ChatError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => error_codes::CONFIG_INVALID,
            Self::ValidationError(_) => error_codes::VALIDATION_FAILED,
            Self::UpstreamError { .. } => error_codes::UPSTREAM_FAILED,
            Self::ParseError(_) => error_codes::PARSE_FAILED,
            Self::RequestError(_) => error_codes::REQUEST_FAILED,
            Self::StreamError(_) => error_codes::STREAM_FAILED,
            Self::Cancelled(_) => error_codes::CANCELLED,
            Self::IoError(_) => error_codes::IO_FAILED,
        }
    }

    /// Returns the inner message without the code prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::UpstreamError { body, .. } => body,
            Self::ConfigError(m)
            | Self::ValidationError(m)
            | Self::ParseError(m)
            | Self::RequestError(m)
            | Self::StreamError(m)
            | Self::Cancelled(m)
            | Self::IoError(m) => m,
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        Self::RequestError(err.to_string())
    }
}

impl From<std::io::Error> for ChatError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, ChatError>;
