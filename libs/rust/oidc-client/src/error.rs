//! Error types for token management.
//!
//! Every failure the manager can hit is a tagged variant, so callers of
//! [`TokenManager::refresh_token`](crate::TokenManager::refresh_token) can tell a
//! rejected refresh token apart from a network error or a broken response.

use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid URL format
    #[error("Invalid URL for {field}: {reason}")]
    InvalidUrl {
        /// Environment variable or field holding the URL
        field: String,
        /// Parser message
        reason: String,
    },

    /// Environment variable parse error
    #[error("Failed to parse environment variable {name}: {reason}")]
    ParseError {
        /// Environment variable name
        name: String,
        /// Parser message
        reason: String,
    },
}

/// Errors raised while obtaining or refreshing tokens.
///
/// The type is `Clone` because a single refresh outcome is handed to every
/// caller that joined the in-flight refresh.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum TokenError {
    /// No refresh token is stored, so no refresh can be attempted
    #[error("No refresh token available")]
    MissingRefreshToken,

    /// A refresh was attempted without a configured base URL
    #[error("Missing `base_url` for the refresh endpoint")]
    MissingBaseUrl,

    /// The refresh endpoint answered 403: the refresh token was rejected
    #[error("Refresh token rejected by the server (403 Forbidden)")]
    Forbidden,

    /// The refresh response carried neither an access nor a refresh token
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// The HTTP call itself failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// The refresh response body was not valid JSON
    #[error("Malformed refresh response: {0}")]
    MalformedResponse(String),

    /// The access token could not be decoded
    #[error("Token decode error: {0}")]
    Decode(String),

    /// A token store failed to read or write
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for token operations.
pub type TokenResult<T> = Result<T, TokenError>;

impl TokenError {
    /// Whether the server rejected the refresh token itself.
    #[must_use]
    pub const fn is_session_rejected(&self) -> bool {
        matches!(self, Self::Forbidden)
    }

    /// Whether the failure was detected locally, without a server round trip
    /// being at fault.
    #[must_use]
    pub const fn is_local(&self) -> bool {
        matches!(
            self,
            Self::MissingRefreshToken
                | Self::MissingBaseUrl
                | Self::ProtocolViolation(_)
                | Self::Config(_)
        )
    }

    /// Stable code for structured logs.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingRefreshToken => "MISSING_REFRESH_TOKEN",
            Self::MissingBaseUrl => "MISSING_BASE_URL",
            Self::Forbidden => "REFRESH_FORBIDDEN",
            Self::ProtocolViolation(_) => "PROTOCOL_VIOLATION",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::MalformedResponse(_) => "MALFORMED_RESPONSE",
            Self::Decode(_) => "DECODE_ERROR",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Create a protocol violation error.
    #[must_use]
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::ProtocolViolation(msg.into())
    }

    /// Create a storage error.
    #[must_use]
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a transport error.
    #[must_use]
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }
}

impl From<reqwest::Error> for TokenError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for TokenError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedResponse(err.to_string())
    }
}

impl From<base64::DecodeError> for TokenError {
    fn from(err: base64::DecodeError) -> Self {
        Self::Decode(err.to_string())
    }
}
