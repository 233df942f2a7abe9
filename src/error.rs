//! Error taxonomy for the engine

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Transport failure or non-success HTTP status
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Malformed playlist content
    #[error("parse error: {0}")]
    Parse(String),

    /// The client-side proxy refused to relay a cross-origin request
    #[error("cross-origin request blocked: {0}")]
    Cors(String),

    /// Provider url is not an absolute http(s) url
    #[error("invalid provider url {url:?}: {reason}")]
    Validation { url: String, reason: String },

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("no enabled providers")]
    NoProviders,

    /// Every failover attempt failed
    #[error("all {attempts} provider attempts failed, last error: {last_error}")]
    Exhausted { attempts: usize, last_error: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn parse(message: impl Into<String>) -> Self {
        Error::Parse(message.into())
    }

    pub fn validation(url: &str, reason: impl Into<String>) -> Self {
        Error::Validation {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}
