//! Error types for the await readiness engine.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for await operations.
pub type AwaitResult<T> = Result<T, AwaitError>;

/// Errors that abort a run.
///
/// Transient probe failures never surface here; checkers absorb them as
/// retries. Only configuration mistakes, deadline exhaustion and launch
/// failures reach the process boundary.
#[derive(Debug, Error)]
pub enum AwaitError {
    #[error(
        "invalid host protocol provided: {scheme} in {raw}. supported protocols are: file, tcp, tcp4, tcp6, unix, http and https"
    )]
    UnsupportedScheme { scheme: String, raw: String },

    #[error("bad URL provided: {raw}. {reason}")]
    InvalidUrl { raw: String, reason: String },

    #[error("bad HTTP header argument: {0}. expected \"headerName: headerValue\"")]
    InvalidHeader(String),

    #[error("--http-header \"{0}\" provided with no --url option")]
    HeaderWithoutTarget(String),

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error(
        "timeout after {timeout:?} awaiting on dependencies to become available: {}",
        pending.join(", ")
    )]
    DeadlineExceeded {
        timeout: Duration,
        pending: Vec<String>,
    },

    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("failed to launch {command}: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl AwaitError {
    pub(crate) fn invalid_url(raw: &str, reason: impl Into<String>) -> Self {
        AwaitError::InvalidUrl {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }
}
