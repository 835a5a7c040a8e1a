use serde_json::Value;
use thiserror::Error;

/// Outcome of one outbound call: the JSON payload, or a failure whose
/// `Display` is the human-readable message shown to the tool caller.
pub type RequestResult = Result<Value, RequestError>;

/// Everything that can go wrong on the outbound request path.
/// Each variant renders the message surfaced to the invoking agent.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Connection refused, DNS failure, timeout, or a body that could not be read.
    #[error("Request failed: {0}")]
    Transport(String),
    /// 2xx response whose body is not JSON.
    #[error("Request failed: response body is not valid JSON: {0}")]
    InvalidBody(String),
    /// Non-2xx status, with the raw response text.
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
    /// Local sliding-window budget exhausted; no network call was made.
    #[error("Rate limit exceeded. Please try again later.")]
    RateLimited,
}

impl RequestError {
    /// Machine-readable code for structured logs.
    pub fn code(&self) -> &'static str {
        match self {
            RequestError::Transport(_) => codes::TRANSPORT_ERROR,
            RequestError::InvalidBody(_) => codes::INVALID_BODY,
            RequestError::HttpStatus { .. } => codes::HTTP_STATUS,
            RequestError::RateLimited => codes::RATE_LIMITED,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid API base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("rate limit must allow at least one request per window")]
    ZeroRateLimit,
    #[error("{field} must be greater than zero")]
    ZeroDuration { field: &'static str },
}

/// Error codes used across the request path
pub mod codes {
    pub const TRANSPORT_ERROR: &str = "transport_error";
    pub const INVALID_BODY: &str = "invalid_body";
    pub const HTTP_STATUS: &str = "http_status";
    pub const RATE_LIMITED: &str = "rate_limited";
}
