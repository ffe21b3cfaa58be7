//! Error types for herald crate.

use std::fmt;
use std::io;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a request to completion.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An auth round produced no request where one was required.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Malformed or absent terminal response.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Request URL could not be constructed or merged.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Transport-level failure (timeouts, connect errors, resets).
    #[error("Network error: {0}")]
    Network(NetworkError),

    /// Redirect limit exceeded.
    #[error("Redirect limit exceeded ({count} redirects)")]
    RedirectLimit { count: usize },

    /// Missing, unparseable or unsupported redirect location.
    #[error("Invalid redirect URL: {0}")]
    InvalidRedirectUrl(String),

    /// Malformed or unsupported Digest challenge.
    #[error("Invalid digest challenge: {0}")]
    InvalidDigestAuth(String),

    /// Digest challenge only offers a qop we do not implement.
    #[error("Digest qop not supported: {0}")]
    QopNotSupported(String),

    /// Write to a stream that was already completed or abandoned.
    #[error("Stream closed")]
    StreamClosed,

    /// Non-success status turned into an error by `Response::error_for_status`.
    #[error("HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },

    /// Buffered body requested before a streamed body was read.
    #[error("Response body has not been read")]
    ResponseNotRead,

    /// Decompression error.
    #[error("Decompression error: {0}")]
    Decompression(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create an invalid request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Create an invalid URL error.
    pub fn invalid_url(message: impl Into<String>) -> Self {
        Self::InvalidUrl(message.into())
    }

    /// Create a network error.
    pub fn network(code: NetworkErrorCode, message: impl Into<String>) -> Self {
        Self::Network(NetworkError::new(code, message))
    }

    /// Create an invalid digest challenge error.
    pub fn invalid_digest(message: impl Into<String>) -> Self {
        Self::InvalidDigestAuth(message.into())
    }

    /// Create an HTTP status error.
    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            message: message.into(),
        }
    }

    /// Whether this is one of the redirect failures.
    pub fn is_redirect_error(&self) -> bool {
        matches!(self, Self::RedirectLimit { .. } | Self::InvalidRedirectUrl(_))
    }

    /// Network error code, if this is a transport failure.
    pub fn network_code(&self) -> Option<NetworkErrorCode> {
        match self {
            Self::Network(e) => Some(e.code),
            _ => None,
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<NetworkError> for Error {
    fn from(err: NetworkError) -> Self {
        Self::Network(err)
    }
}

/// Classification of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorCode {
    /// Connection (and response head) not established in time.
    ConnectTimeout,
    /// No body data received within the read-idle window.
    ReadTimeout,
    /// Whole exchange exceeded its deadline.
    TotalTimeout,
    /// Could not connect.
    Connect,
    /// Peer closed or reset the connection mid-exchange.
    ConnectionReset,
    /// Malformed HTTP on the wire.
    Protocol,
    /// Producer went away without completing the stream.
    Aborted,
    Other,
}

/// Transport failure with its classification.
///
/// Cloneable so the same failure can be attached to an in-progress
/// `Response` and surfaced to whoever is draining its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkError {
    pub code: NetworkErrorCode,
    pub message: String,
}

impl NetworkError {
    pub fn new(code: NetworkErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self.code,
            NetworkErrorCode::ConnectTimeout
                | NetworkErrorCode::ReadTimeout
                | NetworkErrorCode::TotalTimeout
        )
    }
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for NetworkError {}
