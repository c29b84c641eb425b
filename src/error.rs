//! Error types for the feed client
//!
//! Errors are split by where they surface: [`FeedError`] is returned to
//! callers of the public session API, while transport and protocol errors
//! are reported through observers and logs and never abort the session.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Main error type for feed session operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("API key required: no credential configured")]
    MissingCredential,

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Maximum reconnect attempts ({attempts}) reached")]
    ReconnectExhausted { attempts: u32 },

    #[error("Connection attempt abandoned before handshake completed")]
    ConnectAbandoned,

    #[error("Session event loop is no longer running")]
    SessionClosed,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FeedError {
    /// Create invalid input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

impl From<crate::config::ConfigError> for FeedError {
    fn from(error: crate::config::ConfigError) -> Self {
        Self::Config(redact_credentials(&error.to_string()))
    }
}

/// Result type for feed operations
pub type FeedResult<T> = Result<T, FeedError>;

static CREDENTIAL_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)(access_key|api_key|token)=[^&\s]+").ok());

/// Strip credential values from text that may end up in logs or errors.
///
/// The session URL carries the API key as a query parameter, so anything
/// derived from it (URLs, connect errors) goes through here first.
pub fn redact_credentials(text: &str) -> String {
    match CREDENTIAL_PATTERN.as_ref() {
        Some(pattern) => pattern.replace_all(text, "${1}=***").into_owned(),
        None => text.to_string(),
    }
}
